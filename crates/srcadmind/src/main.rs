//! srcadmin daemon - supervises dedicated game-server instances

use anyhow::{Context, Result};
use srcadmin_core::constants;
use srcadmin_db::Database;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;

use app::App;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "srcadmind=info,srcadmin_instance=info,srcadmin_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("srcadmin daemon starting");

    let home = constants::srcadmin_home();
    if !home.exists() {
        std::fs::create_dir_all(&home)
            .with_context(|| format!("creating home directory {}", home.display()))?;
        info!("created home directory {}", home.display());
    }

    let db = Database::new(&constants::db_path())
        .await
        .context("initializing database")?;

    let app = App::new(db);
    app.run().await.context("starting daemon")?;

    wait_for_shutdown().await;

    app.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received ctrl-c");
}
