//! Hubview - terminal viewer for a room hub.
//!
//! Reads its configuration from `HUBVIEW_*` environment variables and logs
//! a status line whenever the session view changes.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use hubview_client::{
    display, logging, spawn_session, ClientConfig, DriverOptions, HttpCredentialProvider,
    Preferences, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let store = Store::open_default();
    let prefs = store
        .as_ref()
        .map(Store::load_preferences)
        .unwrap_or_default();
    let config = ClientConfig::from_env(&prefs);
    config.session.validate().context("invalid configuration")?;

    if let Some(store) = &store {
        let current = Preferences {
            require_auth: config.session.require_credential,
        };
        if current != prefs {
            store
                .save_preferences(&current)
                .context("failed to save preferences")?;
        }
    }

    let provider = Arc::new(HttpCredentialProvider::new(config.issuer_url.clone()));
    let (handle, task) = spawn_session(provider, DriverOptions::default());
    handle.connect(config.session.clone())?;

    let mut views = handle.subscribe();
    let mut last_line = String::new();
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = display::summary_line(&views.borrow_and_update(), Utc::now());
                if line != last_line {
                    hubview_client::log_info!("{}", line);
                    last_line = line;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                hubview_client::log_info!("interrupted, disconnecting");
                handle.disconnect()?;
                handle.shutdown()?;
                break;
            }
        }
    }

    task.await.context("session driver panicked")?;
    Ok(())
}
