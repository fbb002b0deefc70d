use clap::Parser;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;
use svxmon::app::{BootstrapError, Dispatcher, Updater, bootstrap, run_updater};
use svxmon::cli::Cli;
use svxmon::config::{ConfigError, SubscriberConfig, load_config};
use svxmon::domain::{
    AccessConfigError, AccessPolicy, AliasLookup, DialectKind, NoAliases, NoSessions,
};
use svxmon::infra::{
    LineSource, LogFile, LogSourceError, load_subscribers, refresh_subscriber_file,
    watch_log_file,
};
use svxmon::server::{AppState, ServeError, run_server};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
enum MainError {
    #[error("failed to start runtime: {0}")]
    Runtime(io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Access(#[from] AccessConfigError),

    #[error(transparent)]
    LogSource(#[from] LogSourceError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Serve(#[from] ServeError),
}

fn main() {
    let filter = std::env::var("SVXMON_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        tracing::error!(event = "main.fatal", error = %error, "svxmon stopped");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), MainError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(MainError::Runtime)?;
    runtime.block_on(monitor(cli))
}

async fn monitor(cli: Cli) -> Result<(), MainError> {
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let kind = DialectKind::from_log_path(&config.log_file);
    tracing::info!(
        event = "main.start",
        system = %config.system_name,
        log = %config.log_file.display(),
        dialect = kind.label(),
        "starting monitor"
    );

    let policy = AccessPolicy::from_config(&config.allowed_clients, OffsetDateTime::now_utc())?;
    let source = LogFile::open(&config.log_file)?;
    let aliases = load_aliases(&config.subscribers).await;

    let dialect = kind.into_dialect();
    let log = source.current_lines()?;
    let outcome = bootstrap(dialect.as_ref(), &log, aliases)?;

    let dispatcher = Arc::new(Dispatcher::new(
        policy,
        Arc::new(NoSessions),
        outcome.table.snapshot(),
    ));

    let watcher = if config.watch_log {
        match watch_log_file(&config.log_file) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                tracing::warn!(event = "watch.unavailable", error = %error, "polling only");
                None
            }
        }
    } else {
        None
    };

    let updater = Updater::new(source, dialect, outcome);
    let state = AppState {
        dispatcher: dispatcher.clone(),
        trust_proxy_headers: config.trust_proxy_headers,
    };

    tokio::select! {
        result = run_server(config.listen, state) => result?,
        _ = run_updater(updater, dispatcher, config.poll_interval(), watcher) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(event = "main.shutdown", "interrupted");
        }
    }
    Ok(())
}

/// The dictionary only enriches records: every failure here degrades to no aliases.
async fn load_aliases(subscribers: &SubscriberConfig) -> Arc<dyn AliasLookup> {
    if let Some(url) = subscribers.url.clone() {
        let path = subscribers.file.clone();
        let reload_days = subscribers.reload_days;
        let refreshed = tokio::task::spawn_blocking(move || {
            refresh_subscriber_file(&path, &url, reload_days, SystemTime::now())
        })
        .await;
        match refreshed {
            Ok(Ok(outcome)) => {
                tracing::info!(event = "subscribers.refresh", outcome = ?outcome, "subscriber file checked");
            }
            Ok(Err(error)) => {
                tracing::warn!(event = "subscribers.download_failed", error = %error, "keeping local subscriber file");
            }
            Err(error) => {
                tracing::warn!(event = "subscribers.download_failed", error = %error, "download task failed");
            }
        }
    }

    match load_subscribers(&subscribers.file) {
        Ok(directory) => {
            if directory.is_empty() {
                tracing::warn!(
                    event = "subscribers.empty",
                    path = %subscribers.file.display(),
                    "no subscriber entries loaded"
                );
            } else {
                tracing::info!(event = "subscribers.loaded", entries = directory.len(), "subscriber directory ready");
            }
            Arc::new(directory)
        }
        Err(error) => {
            tracing::warn!(event = "subscribers.load_failed", error = %error, "continuing without aliases");
            Arc::new(NoAliases)
        }
    }
}
