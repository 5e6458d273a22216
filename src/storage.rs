use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{ConversationKey, User};

/// Who is logged in, plus per-user panel preferences.
pub trait SessionStore: Send + Sync {
    fn current_user(&self) -> Result<Option<User>>;
    fn login(&self, user: &User) -> Result<()>;
    fn logout(&self) -> Result<()>;
    fn favorites(&self) -> Result<HashSet<ConversationKey>>;
    fn set_favorite(&self, key: &ConversationKey, favorite: bool) -> Result<()>;
}

pub struct SessionStorage {
    conn: Mutex<Connection>,
}

impl SessionStorage {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                user_json TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS favorites (
                kind TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                PRIMARY KEY (kind, conversation_id)
            )",
            [],
        )?;
        Ok(SessionStorage {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn kind_of(key: &ConversationKey) -> &'static str {
    if key.is_group() {
        "group"
    } else {
        "direct"
    }
}

impl SessionStore for SessionStorage {
    fn current_user(&self) -> Result<Option<User>> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row("SELECT user_json FROM session WHERE slot = 0", [], |row| row.get(0))
            .optional()?;
        match raw {
            Some(json) => {
                let user: User = serde_json::from_str(&json)?;
                Ok(Some(user).filter(|u| !u.id.is_empty()))
            }
            None => Ok(None),
        }
    }

    fn login(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.conn().execute(
            "INSERT INTO session (slot, user_json) VALUES (0, ?1)
             ON CONFLICT(slot) DO UPDATE SET user_json = excluded.user_json",
            [&json],
        )?;
        Ok(())
    }

    fn logout(&self) -> Result<()> {
        self.conn().execute("DELETE FROM session", [])?;
        Ok(())
    }

    fn favorites(&self) -> Result<HashSet<ConversationKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT kind, conversation_id FROM favorites")?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok(if kind == "group" {
                ConversationKey::Group(id)
            } else {
                ConversationKey::Direct(id)
            })
        })?;
        let mut favorites = HashSet::new();
        for key in rows {
            favorites.insert(key?);
        }
        Ok(favorites)
    }

    fn set_favorite(&self, key: &ConversationKey, favorite: bool) -> Result<()> {
        let conn = self.conn();
        if favorite {
            conn.execute(
                "INSERT OR IGNORE INTO favorites (kind, conversation_id) VALUES (?1, ?2)",
                (kind_of(key), key.id()),
            )?;
        } else {
            conn.execute(
                "DELETE FROM favorites WHERE kind = ?1 AND conversation_id = ?2",
                (kind_of(key), key.id()),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_in_memory_db() -> SessionStorage {
        SessionStorage::new(":memory:").unwrap()
    }

    #[test]
    fn test_no_user_before_login() {
        let storage = setup_in_memory_db();
        assert_eq!(storage.current_user().unwrap(), None);
    }

    #[test]
    fn test_login_and_get_user() {
        let storage = setup_in_memory_db();
        let user = User {
            id: "alice".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: Some("Martin".to_string()),
            groups: vec!["g1".to_string()],
        };

        storage.login(&user).unwrap();
        let retrieved = storage.current_user().unwrap().unwrap();
        assert_eq!(user, retrieved);
    }

    #[test]
    fn test_login_replaces_previous_user() {
        let storage = setup_in_memory_db();
        storage.login(&User::with_id("alice")).unwrap();
        storage.login(&User::with_id("bob")).unwrap();
        assert_eq!(storage.current_user().unwrap().unwrap().id, "bob");
    }

    #[test]
    fn test_logout() {
        let storage = setup_in_memory_db();
        storage.login(&User::with_id("alice")).unwrap();
        storage.logout().unwrap();
        assert_eq!(storage.current_user().unwrap(), None);
    }

    #[test]
    fn test_user_with_empty_id_is_not_logged_in() {
        let storage = setup_in_memory_db();
        storage.login(&User::with_id("")).unwrap();
        assert_eq!(storage.current_user().unwrap(), None);
    }

    #[test]
    fn test_favorites_distinguish_groups() {
        let storage = setup_in_memory_db();
        let direct = ConversationKey::Direct("x".to_string());
        let group = ConversationKey::Group("x".to_string());

        storage.set_favorite(&group, true).unwrap();
        storage.set_favorite(&group, true).unwrap();
        let favorites = storage.favorites().unwrap();
        assert!(favorites.contains(&group));
        assert!(!favorites.contains(&direct));

        storage.set_favorite(&group, false).unwrap();
        assert!(storage.favorites().unwrap().is_empty());
    }
}
