//! # wsi
//!
//! Server binary: loads settings, wires the dispatcher, token verifier and
//! built-in methods into the HTTP/WebSocket server, and runs until Ctrl-C.

#![deny(unsafe_code)]

mod methods;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use wsi_rpc::{AuthError, Dispatcher, DispatchMode, JwtVerifier, MethodRegistry, TokenVerifier};
use wsi_server::{ServerConfig, WsiServer};
use wsi_settings::{AuthSettings, WsiSettings};

/// How long shutdown waits for open sessions.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated JSON RPC over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "wsi", about = "Authenticated JSON RPC over WebSocket")]
struct Cli {
    /// Settings file (default `~/.wsi/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter, e.g. `debug` or `wsi_rpc=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

/// Load settings and apply CLI overrides on top.
fn resolve_settings(cli: &Cli) -> Result<WsiSettings> {
    let path = cli.config.clone().unwrap_or_else(wsi_settings::settings_path);
    let mut settings = wsi_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    settings.validate().context("Invalid settings after CLI overrides")?;
    Ok(settings)
}

/// Build the token verifier, or `None` when no key is configured.
fn build_verifier(auth: &AuthSettings) -> Result<Option<Arc<dyn TokenVerifier>>> {
    match JwtVerifier::from_settings(auth) {
        Ok(verifier) => {
            tracing::info!(algorithms = ?auth.algorithms, "token verification enabled");
            let verifier: Arc<dyn TokenVerifier> = Arc::new(verifier);
            Ok(Some(verifier))
        }
        Err(AuthError::NotConfigured) => {
            tracing::warn!(
                "no verification key configured; auth-gated methods will answer \"Authorization Required\""
            );
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to build token verifier"),
    }
}

/// Assemble the dispatcher with built-in methods.
fn build_dispatcher(settings: &WsiSettings) -> Result<Dispatcher> {
    let mut registry = MethodRegistry::new();
    methods::register_builtins(&mut registry);

    let mut dispatcher = Dispatcher::new(registry)
        .with_mode(DispatchMode::from_ordered(settings.dispatch.ordered));
    if let Some(verifier) = build_verifier(&settings.auth)? {
        dispatcher = dispatcher.with_verifier(verifier);
    }
    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    wsi_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics_handle = wsi_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let dispatcher = build_dispatcher(&settings)?;
    let method_count = dispatcher.registry().len();
    let mode = dispatcher.mode();

    let config = ServerConfig::from(&settings.server);
    let server = WsiServer::new(config, dispatcher).with_metrics(metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        ?mode,
        "wsi listening on ws://{addr}/ws ({method_count} methods registered)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_TIMEOUT))
        .await;

    tracing::info!(drained, "Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("wsi").chain(args.iter().copied()))
    }

    fn write_settings(dir: &tempfile::TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn cli_defaults_to_no_overrides() {
        let cli = cli(&[]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = cli(&[
            "--config",
            "/etc/wsi.json",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/wsi.json")));
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_settings(&dir, r#"{"server":{"host":"10.0.0.1","port":7000}}"#);
        let path = path.to_str().unwrap();

        let from_file = resolve_settings(&cli(&["--config", path])).unwrap();
        assert_eq!(from_file.server.port, 7000);

        let overridden =
            resolve_settings(&cli(&["--config", path, "--port", "7001", "--log-level", "warn"]))
                .unwrap();
        assert_eq!(overridden.server.host, "10.0.0.1");
        assert_eq!(overridden.server.port, 7001);
        assert_eq!(overridden.logging.level, "warn");
    }

    #[test]
    fn invalid_settings_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_settings(&dir, "{not json");
        assert!(resolve_settings(&cli(&["--config", path.to_str().unwrap()])).is_err());
    }

    #[test]
    fn empty_host_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(resolve_settings(&cli(&["--config", path.to_str().unwrap(), "--host", ""])).is_err());
    }

    #[test]
    fn verifier_absent_without_key() {
        assert!(build_verifier(&AuthSettings::default()).unwrap().is_none());
    }

    #[test]
    fn verifier_built_from_secret() {
        let auth = AuthSettings {
            secret: Some("s3cret".into()),
            ..AuthSettings::default()
        };
        assert!(build_verifier(&auth).unwrap().is_some());
    }

    #[test]
    fn bad_auth_config_is_fatal() {
        let auth = AuthSettings {
            secret: Some("s3cret".into()),
            algorithms: vec!["HS256".into(), "ES256".into()],
            ..AuthSettings::default()
        };
        assert!(build_verifier(&auth).is_err());
    }

    #[test]
    fn dispatcher_has_builtins_and_mode() {
        let mut settings = WsiSettings::default();
        settings.dispatch.ordered = true;
        let d = build_dispatcher(&settings).unwrap();
        assert_eq!(d.mode(), DispatchMode::Ordered);
        assert!(!d.has_verifier());
        assert_eq!(
            d.registry().methods(),
            vec!["echo", "ping", "system.methods", "whoami"]
        );
    }
}
