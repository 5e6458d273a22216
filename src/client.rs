use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::PanelError;
use crate::models::{ConversationKey, MessageStatus, User};
use crate::panel::{DiscussionFilter, Panel, PassOutcome, ThreadOutcome};
use crate::storage::SessionStore;
use crate::view::{self, EmptyState};

const HELP: &str = "Commands: list | open <id> | group <id> | send <text> | close | \
filter all|unread|favorites|groups | fav <id> | refresh | login <user-id> | logout | exit";

enum Command {
    List,
    Open(String),
    OpenGroup(String),
    Send(String),
    Close,
    Filter(String),
    Favorite(String),
    Refresh,
    Login(String),
    Logout,
    Help,
    Exit,
}

fn parse(line: &str) -> Option<Command> {
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let command = match (head.to_lowercase().as_str(), rest.is_empty()) {
        ("list", _) => Command::List,
        ("open", false) => Command::Open(rest.to_string()),
        ("group", false) => Command::OpenGroup(rest.to_string()),
        ("send", false) => Command::Send(rest.to_string()),
        ("close", _) => Command::Close,
        ("filter", false) => Command::Filter(rest.to_string()),
        ("fav", false) => Command::Favorite(rest.to_string()),
        ("refresh", _) => Command::Refresh,
        ("login", false) => Command::Login(rest.to_string()),
        ("logout", _) => Command::Logout,
        ("help", _) => Command::Help,
        ("exit" | "quit", _) => Command::Exit,
        _ => return None,
    };
    Some(command)
}

fn status_mark(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sent => "✓",
        MessageStatus::Delivered => "✓✓",
        MessageStatus::Read => "✓✓ read",
    }
}

pub fn render_discussions(panel: &Panel) {
    let snapshot = panel.snapshot();
    let user_id = match panel.current_user() {
        Ok(user) => user.id,
        Err(_) => {
            println!("Not logged in. Use 'login <user-id>'.");
            return;
        }
    };

    println!("── Discussions ({:?}) ──", snapshot.filter);
    match view::empty_state(&snapshot) {
        Some(EmptyState::NoConversations) => println!("  No discussions yet. Start a new conversation."),
        Some(EmptyState::LoadFailed) => println!("  Could not load discussions. Retrying..."),
        None => {
            if snapshot.load_failed {
                println!("  (showing last known discussions, refresh failed)");
            }
            for row in view::discussion_rows(&snapshot, &user_id) {
                let marker = if row.highlighted { "*" } else { " " };
                let star = if row.is_favorite { "★ " } else { "" };
                let badge = row.badge.map(|b| format!(" ({})", b)).unwrap_or_default();
                let status = row.own_status.map(|s| format!("{} ", status_mark(s))).unwrap_or_default();
                println!(
                    "{} [{}] {}{}{}  {}  {}{}",
                    marker,
                    row.avatar,
                    star,
                    row.name,
                    badge,
                    row.time,
                    status,
                    row.preview
                );
                let kind = if row.key.is_group() { "group" } else { "contact" };
                let phone = row.phone.map(|p| format!(" · {}", p)).unwrap_or_default();
                println!("      {} {}{}", kind, row.key.id(), phone);
            }
        }
    }
}

pub fn render_thread(panel: &Panel) {
    let snapshot = panel.snapshot();
    let Some(active) = snapshot.active else {
        println!("Select a conversation to start chatting.");
        return;
    };
    let user_id = match panel.current_user() {
        Ok(user) => user.id,
        Err(_) => return,
    };

    println!("── {} ──", active.name);
    if snapshot.thread_failed || snapshot.thread.is_empty() {
        println!("  No messages in this conversation. Send the first one!");
        return;
    }
    for section in view::thread_sections(&snapshot.thread, &user_id) {
        println!("        {}", section.label);
        for bubble in section.bubbles {
            if bubble.own {
                println!("{:>40} {} {}", bubble.content, bubble.time, status_mark(bubble.status));
            } else {
                println!("{} {}", bubble.content, bubble.time);
            }
        }
    }
}

async fn open(panel: &Panel, key: ConversationKey) {
    match panel.select_conversation(key, None).await {
        Ok(ThreadOutcome::Failed) => println!("Error: could not load messages"),
        Ok(_) => render_thread(panel),
        Err(e) => println!("Error: {}", e),
    }
}

/// Reads commands from stdin until `exit` or end of input.
pub async fn run_client(panel: Arc<Panel>, session: Arc<dyn SessionStore>) -> Result<()> {
    println!("{}", HELP);
    render_discussions(&panel);

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(command) = parse(line) else {
            println!("Unknown command. {}", HELP);
            continue;
        };

        match command {
            Command::Exit => {
                println!("Exiting client...");
                break;
            }
            Command::Help => println!("{}", HELP),
            Command::List => render_discussions(&panel),
            Command::Open(id) => {
                let key = panel
                    .find_conversation(&id)
                    .unwrap_or(ConversationKey::Direct(id));
                open(&panel, key).await;
            }
            Command::OpenGroup(id) => open(&panel, ConversationKey::Group(id)).await,
            Command::Send(text) => match panel.send_message(&text).await {
                Ok(_) => render_thread(&panel),
                Err(PanelError::NoActiveConversation) => println!("Open a conversation first"),
                Err(e) => println!("Error sending message: {}", e),
            },
            Command::Close => {
                panel.clear_conversation();
                render_thread(&panel);
            }
            Command::Filter(raw) => match raw.parse::<DiscussionFilter>() {
                Ok(filter) => {
                    panel.set_filter(filter);
                    render_discussions(&panel);
                }
                Err(e) => println!("Error: {}", e),
            },
            Command::Favorite(id) => match panel.find_conversation(&id) {
                Some(key) => match panel.toggle_favorite(&key) {
                    Ok(true) => println!("Added {} to favorites", id),
                    Ok(false) => println!("Removed {} from favorites", id),
                    Err(e) => println!("Error: {}", e),
                },
                None => println!("No discussion with id {}", id),
            },
            Command::Refresh => match panel.refresh_conversations().await {
                Ok(PassOutcome::Skipped) => println!("A refresh is already running"),
                Ok(_) => render_discussions(&panel),
                Err(e) => println!("Error: {}", e),
            },
            Command::Login(id) => {
                session.login(&User::with_id(id.clone()))?;
                println!("Logged in as {}", id);
                panel.reset();
                if let Err(e) = panel.refresh_conversations().await {
                    println!("Error: {}", e);
                }
                render_discussions(&panel);
            }
            Command::Logout => {
                session.logout()?;
                panel.reset();
                println!("Logged out");
            }
        }
    }

    Ok(())
}
