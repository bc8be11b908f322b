use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Env;

use mdlive::config::Config;
use mdlive::session::DocumentSession;
use mdlive::watch::WatchRegistry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse configuration from command line and environment
    let config = Config::from_args_and_env()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    let registry = Arc::new(WatchRegistry::new().context("failed to start file watcher")?);

    let mut session = DocumentSession::open(&config.file, registry)
        .await
        .with_context(|| format!("failed to open {}", config.file.display()))?;

    log::info!("previewing {}", session.path().display());

    let mut markup = session.rendered_markup();
    emit(&config, &markup.borrow_and_update())?;

    loop {
        tokio::select! {
            changed = markup.changed() => {
                // The session holds the sender, so Err only occurs at teardown.
                if changed.is_err() {
                    break;
                }
                let html = markup.borrow_and_update().clone();
                emit(&config, &html)?;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
        }
    }

    session.close();
    Ok(())
}

/// Write one rendered snapshot to the configured destination.
fn emit(config: &Config, html: &str) -> Result<()> {
    match &config.out {
        Some(path) => std::fs::write(path, html)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{html}"),
    }
    Ok(())
}
