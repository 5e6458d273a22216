use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, error, info};

use conversation_panel::client::run_client;
use conversation_panel::{
    Config, HttpDirectory, HttpMessageService, Panel, PanelError, Poller, SessionStorage,
    SessionStore, User,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let session: Arc<dyn SessionStore> = Arc::new(SessionStorage::new(&config.database_url)?);
    if let Some(user_id) = &config.user_id {
        session.login(&User::with_id(user_id.clone()))?;
        info!("Logged in as {}", user_id);
    }

    let http = reqwest::Client::builder().build()?;
    let service = Arc::new(HttpMessageService::with_client(http.clone(), &config.messages_url));
    let directory = Arc::new(HttpDirectory::new(http, &config.directory_url));
    info!("Polling {} as backend", service.messages_url());
    let panel = Arc::new(Panel::new(
        service,
        directory,
        Arc::clone(&session),
        config.read_override_cycles,
    ));

    let discussions = {
        let panel = Arc::clone(&panel);
        Poller::start("discussions", config.discussion_poll, move || {
            let panel = Arc::clone(&panel);
            async move {
                match panel.refresh_conversations().await {
                    Ok(_) => {}
                    Err(PanelError::NotAuthenticated) => debug!("No user logged in, discussions idle"),
                    Err(e) => error!("Discussion refresh aborted: {}", e),
                }
            }
        })
    };
    let messages = {
        let panel = Arc::clone(&panel);
        Poller::start("messages", config.message_poll, move || {
            let panel = Arc::clone(&panel);
            async move {
                match panel.load_messages().await {
                    Ok(_) | Err(PanelError::NotAuthenticated) => {}
                    Err(e) => error!("Message refresh aborted: {}", e),
                }
            }
        })
    };

    tokio::select! {
        result = run_client(Arc::clone(&panel), session) => result?,
        _ = tokio::signal::ctrl_c() => println!("Shutting down client..."),
    }

    messages.stop().await;
    discussions.stop().await;
    Ok(())
}
