//! Example demonstrating automatic hot-reload of a configuration file.
//!
//! This example shows how to:
//! - Register a configuration file with a typed destination
//! - Consume the reload and error streams
//! - Shut the reloader down by cancelling its scope
//!
//! Run with: cargo run --example hot_reload
//!
//! While running, edit demos/config/hot_reload.yaml to see automatic reloads.
//! Saving invalid YAML is reported and rolled back.

use config_reload::prelude::*;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Default, Deserialize, Clone)]
struct AppConfig {
    server: ServerConfig,
    database: DatabaseConfig,
}

#[derive(Debug, Default, Deserialize, Clone)]
struct ServerConfig {
    port: u16,
    host: String,
}

#[derive(Debug, Default, Deserialize, Clone)]
struct DatabaseConfig {
    url: String,
    max_connections: u32,
}

const CONFIG_PATH: &str = "demos/config/hot_reload.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "config_reload=info".into()),
        )
        .init();

    let path = Path::new(CONFIG_PATH);
    if !path.exists() {
        let create = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(
                path,
                r#"server:
  port: 8080
  host: localhost

database:
  url: postgres://localhost/mydb
  max_connections: 10
"#,
            )
        };
        create(path).map_err(|source| ConfigError::Inaccessible {
            path: path.to_path_buf(),
            source,
        })?;
        info!("created {CONFIG_PATH}");
    }

    let scope = CancellationToken::new();
    let reloader = ConfigReloader::builder()
        .with_file_rollback(true)
        .with_debounce(Duration::from_millis(500))
        .build(scope.clone())?;

    let config = ConfigHandle::<AppConfig>::default();
    reloader.add_configuration(path, config.clone())?;

    let cfg = config.get();
    println!("Current configuration:");
    println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
    println!(
        "  Database: {} (max connections: {})",
        cfg.database.url, cfg.database.max_connections
    );
    println!("\n===> Try editing {CONFIG_PATH} to see automatic reloads! <===");
    println!("Press Ctrl+C to exit\n");

    let errors = reloader.error_stream();
    let error_task = tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            println!("[Error] {err}");
        }
    });

    let reloads = reloader.reload_stream();
    let reload_task = tokio::spawn(async move {
        let mut count = 0;
        while let Some(file) = reloads.recv().await {
            count += 1;
            let cfg = config.get();
            println!(
                "[Reload #{count}] {} -> {}:{} (db max: {})",
                file.path().display(),
                cfg.server.host,
                cfg.server.port,
                cfg.database.max_connections
            );
        }
        count
    });

    let _ = tokio::signal::ctrl_c().await;
    scope.cancel();

    // Both streams close once the reloader has shut down
    let _ = error_task.await;
    let count = reload_task.await.unwrap_or_default();
    println!("\nShut down after {count} reloads");
    Ok(())
}
