//! Full integration tests exercising the reload pipeline end to end.

use config_reload::core::{Destination, Format, Snapshot};
use config_reload::error::DecodeError;
use config_reload::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
struct ServerConfig {
    port: u16,
}

const DEBOUNCE: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(5);

struct Pipeline {
    _temp_dir: TempDir,
    path: PathBuf,
    scope: CancellationToken,
    config: ConfigHandle<ServerConfig>,
    reloader: ConfigReloader,
}

fn pipeline(rollback: bool) -> Pipeline {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"port": 80}"#).unwrap();

    let scope = CancellationToken::new();
    let reloader = ConfigReloader::builder()
        .with_debounce(DEBOUNCE)
        .with_file_rollback(rollback)
        .build(scope.clone())
        .unwrap();

    let config = ConfigHandle::default();
    reloader.add_configuration(&path, config.clone()).unwrap();

    Pipeline {
        _temp_dir: temp_dir,
        path,
        scope,
        config,
        reloader,
    }
}

async fn next_reload(stream: &OutcomeStream<Arc<TrackedFile>>) -> Arc<TrackedFile> {
    timeout(WAIT, stream.recv())
        .await
        .expect("timed out waiting for a reload")
        .expect("reload stream closed")
}

async fn next_error(stream: &OutcomeStream<ConfigError>) -> ConfigError {
    timeout(WAIT, stream.recv())
        .await
        .expect("timed out waiting for an error")
        .expect("error stream closed")
}

#[tokio::test]
async fn test_reload_then_decode_failure() {
    let p = pipeline(false);
    let reloads = p.reloader.reload_stream();
    let errors = p.reloader.error_stream();

    fs::write(&p.path, r#"{"port":8080}"#).unwrap();
    let file = next_reload(&reloads).await;
    assert_eq!(file.snapshot::<ServerConfig>().unwrap().port, 8080);
    assert_eq!(p.config.get().port, 8080);

    fs::write(&p.path, "{not json").unwrap();
    let err = next_error(&errors).await;
    let canonical = p.path.canonicalize().unwrap();
    assert_eq!(err.path(), Some(canonical.as_path()));
    assert!(err.to_string().contains(&canonical.display().to_string()));

    // The last good value survives
    let file = p.reloader.get(&p.path).unwrap();
    assert_eq!(file.snapshot::<ServerConfig>().unwrap().port, 8080);
    assert_eq!(file.version(), 1);
    assert_eq!(p.config.get().port, 8080);

    // Without rollback the broken file stays as written
    assert_eq!(fs::read_to_string(&p.path).unwrap(), "{not json");
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Listener {
    #[serde(rename = "Port")]
    port: u16,
}

#[tokio::test]
async fn test_mixed_case_keys_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("listener.json");
    fs::write(&path, r#"{"Port":80}"#).unwrap();

    let reloader = ConfigReloader::builder()
        .with_debounce(DEBOUNCE)
        .build(CancellationToken::new())
        .unwrap();
    let listener = ConfigHandle::<Listener>::default();
    reloader.add_configuration(&path, listener.clone()).unwrap();
    assert_eq!(listener.get().port, 80);

    let reloads = reloader.reload_stream();
    let errors = reloader.error_stream();

    fs::write(&path, r#"{"Port":8080}"#).unwrap();
    let file = next_reload(&reloads).await;
    assert_eq!(file.snapshot::<Listener>().unwrap().port, 8080);

    fs::write(&path, "{not json").unwrap();
    let err = next_error(&errors).await;
    assert_eq!(err.path(), Some(path.canonicalize().unwrap().as_path()));
    assert_eq!(listener.get().port, 8080);
}

#[tokio::test]
async fn test_rapid_writes_reload_once() {
    let p = pipeline(false);
    let reloads = p.reloader.reload_stream();

    for port in 1..=10u16 {
        fs::write(&p.path, format!(r#"{{"port": {port}}}"#)).unwrap();
        sleep(Duration::from_millis(10)).await;
    }

    let file = next_reload(&reloads).await;
    assert_eq!(file.snapshot::<ServerConfig>().unwrap().port, 10);
    assert_eq!(file.version(), 1);

    let extra = timeout(DEBOUNCE * 5, reloads.recv()).await;
    assert!(extra.is_err(), "burst produced more than one reload");
}

#[tokio::test]
async fn test_rollback_restores_last_good_contents() {
    let p = pipeline(true);
    let reloads = p.reloader.reload_stream();
    let errors = p.reloader.error_stream();

    fs::write(&p.path, r#"{"port": 8443}"#).unwrap();
    next_reload(&reloads).await;

    fs::write(&p.path, "port = 'not json'").unwrap();
    let err = next_error(&errors).await;
    assert!(matches!(err, ConfigError::Decode { .. }));

    assert_eq!(fs::read_to_string(&p.path).unwrap(), r#"{"port": 8443}"#);
    assert_eq!(p.config.get().port, 8443);

    // Restoring the file is not reported as a reload
    let echo = timeout(DEBOUNCE * 5, reloads.recv()).await;
    assert!(echo.is_err());
}

#[tokio::test]
async fn test_rename_over_file_is_detected() {
    let p = pipeline(false);
    let reloads = p.reloader.reload_stream();

    let staging = p.path.with_extension("json.tmp");
    fs::write(&staging, r#"{"port": 9999}"#).unwrap();
    fs::rename(&staging, &p.path).unwrap();

    let file = next_reload(&reloads).await;
    assert_eq!(file.snapshot::<ServerConfig>().unwrap().port, 9999);
}

#[tokio::test]
async fn test_remove_configuration_stops_reloads() {
    let p = pipeline(false);
    let reloads = p.reloader.reload_stream();

    assert!(p.reloader.remove_configuration(&p.path));
    fs::write(&p.path, r#"{"port": 8080}"#).unwrap();

    let outcome = timeout(DEBOUNCE * 5, reloads.recv()).await;
    assert!(outcome.is_err());
    assert_eq!(p.config.get().port, 80);
}

#[tokio::test]
async fn test_scope_cancellation_closes_streams() {
    let p = pipeline(false);
    let reloads = p.reloader.reload_stream();
    let errors = p.reloader.error_stream();

    // Leave a change in flight, then cancel the root scope
    fs::write(&p.path, r#"{"port": 8080}"#).unwrap();
    sleep(DEBOUNCE / 2).await;
    p.scope.cancel();

    let delivered = timeout(WAIT, async {
        let mut delivered = 0;
        while reloads.recv().await.is_some() {
            delivered += 1;
        }
        while errors.recv().await.is_some() {}
        delivered
    })
    .await
    .expect("streams did not close after cancellation");
    assert!(delivered <= 1);

    assert!(p.reloader.is_stopped());
    // Stopping after the scope already shut things down is harmless
    p.reloader.stop().await;
}

/// Decodes like a `ConfigHandle` but holds the reload open for a while once
/// registration is done.
struct SlowDestination {
    inner: ConfigHandle<ServerConfig>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl Destination for SlowDestination {
    fn decode(
        &self,
        source: &str,
        format: Format,
    ) -> std::result::Result<Snapshot, DecodeError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            std::thread::sleep(self.delay);
        }
        self.inner.decode(source, format)
    }

    fn publish(&self, snapshot: &Snapshot) {
        self.inner.publish(snapshot);
    }
}

#[tokio::test]
async fn test_scope_cancellation_during_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"port": 80}"#).unwrap();

    let scope = CancellationToken::new();
    let reloader = ConfigReloader::builder()
        .with_debounce(DEBOUNCE)
        .build(scope.clone())
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let config = ConfigHandle::<ServerConfig>::default();
    reloader
        .add_configuration(
            &path,
            SlowDestination {
                inner: config.clone(),
                calls: Arc::clone(&calls),
                delay: Duration::from_millis(800),
            },
        )
        .unwrap();

    let reloads = reloader.reload_stream();
    let errors = reloader.error_stream();

    fs::write(&path, r#"{"port": 8080}"#).unwrap();
    timeout(WAIT, async {
        while calls.load(Ordering::SeqCst) < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reload never started");

    // The decode is still sleeping when the scope goes away
    scope.cancel();

    let reload = timeout(WAIT, reloads.recv()).await.unwrap();
    assert!(reload.is_none(), "reload delivered after cancellation");
    let error = timeout(WAIT, errors.recv()).await.unwrap();
    assert!(error.is_none(), "error delivered after cancellation");
    assert!(reloader.is_stopped());
}

#[tokio::test]
async fn test_stop_does_not_cancel_callers_scope() {
    let p = pipeline(false);

    p.reloader.stop().await;

    assert!(p.reloader.is_stopped());
    assert!(!p.scope.is_cancelled());
    assert!(p.reloader.reload_stream().recv().await.is_none());
}

#[tokio::test]
async fn test_slow_consumer_delays_but_loses_nothing() {
    let p = pipeline(false);
    let reloads = p.reloader.reload_stream();

    fs::write(&p.path, r#"{"port": 1}"#).unwrap();
    sleep(DEBOUNCE * 4).await;
    fs::write(&p.path, r#"{"port": 2}"#).unwrap();
    sleep(DEBOUNCE * 4).await;

    let first = next_reload(&reloads).await;
    let second = next_reload(&reloads).await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.version(), 2);
    assert_eq!(p.config.get().port, 2);
}
