/**
 * StudySync Agent - Main Entry Point
 *
 * Headless background sync: restores the persisted session, runs the
 * periodic sync loop and stops cleanly on Ctrl-C.
 *
 * Usage: studysync-agent [config.toml]
 */
use std::path::PathBuf;

use studysync::client::{AppContext, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    tracing::info!(api = %config.app().api_base_url, "Starting StudySync agent");

    let context = AppContext::new(config).await?;

    match context.auth.restore_session().await {
        Ok(Some(identity)) => tracing::info!(
            uid = %identity.uid,
            remote = identity.is_from_remote,
            "Session restored"
        ),
        Ok(None) => tracing::warn!("No saved session; sign in from the app to enable sync"),
        Err(e) => tracing::error!(error = %e, "Failed to restore session"),
    }

    context.start().await;

    let mut status = context.sync.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                tracing::info!(
                    phase = ?snapshot.phase,
                    online = snapshot.is_online,
                    pending = snapshot.pending_changes,
                    error = ?snapshot.error,
                    "Sync status"
                );
            }
        }
    }

    tracing::info!("Shutting down");
    context.shutdown().await;
    Ok(())
}
