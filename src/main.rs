//! k8swatch - watch Kubernetes resources and fan change events out to sinks

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use k8swatch::api::{self, ApiState, EventStore};
use k8swatch::config::{Config, K8sConfig, CONFIG_ENV};
use k8swatch::retry::RetryConfig;
use k8swatch::runner::{classifier_from_config, controller_config, Runner};
use k8swatch::sink::{resolve_sinks, ElasticsearchSink, Sink};
use k8swatch::telemetry::{init_telemetry, TelemetryConfig};

/// k8swatch - Kubernetes resource watcher with alerting and event export
#[derive(Parser, Debug)]
#[command(name = "k8swatch", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Workers per resource controller (overrides settings.threadiness)
    #[arg(long)]
    threadiness: Option<usize>,

    /// Query API port (overrides settings.httpPort)
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install TLS crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_overrides(cli.threadiness, cli.http_port);
    config.validate().context("invalid configuration")?;

    init_telemetry(TelemetryConfig::from_settings(&config.settings))
        .context("failed to initialize telemetry")?;

    info!(
        cluster = %config.k8s.cluster_name,
        threadiness = config.settings.threadiness,
        http_port = config.settings.http_port,
        "Starting k8swatch"
    );

    let kinds = config.enabled_resources()?;
    if kinds.is_empty() {
        warn!("No resources enabled, nothing will be watched");
    }

    let client = kube_client(&config.k8s).await?;
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let sinks = resolve_sinks(&config, http.clone(), classifier_from_config(&config)).await;
    info!(sinks = ?sinks.enabled_kinds(), "Sinks registered");

    let store = event_store(&config, http).await;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.settings.http_port));
    let api_state = ApiState::new(store, shutdown.clone());
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::serve(addr, api_state).await {
            error!(error = %e, "Query API stopped");
        }
    });

    let runner = Runner::new(client, kinds, sinks, controller_config(&config.settings));
    let summary = runner.run(shutdown.clone()).await;
    for (kind, e) in &summary.failed {
        error!(%kind, error = %e, "Controller did not run");
    }

    // Controllers end early only when none could start; keep serving until stopped
    shutdown.cancelled().await;
    if let Err(e) = api_task.await {
        error!(error = %e, "Query API task panicked");
    }
    info!("k8swatch stopped");
    Ok(())
}

/// Client from `k8s.kubeconfig` when set, else in-cluster / default config
async fn kube_client(k8s: &K8sConfig) -> anyhow::Result<Client> {
    match &k8s.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("invalid kubeconfig")?;
            Client::try_from(config).context("failed to create Kubernetes client")
        }
        None => Client::try_default()
            .await
            .context("failed to create Kubernetes client"),
    }
}

/// Search backend for the query API, when the index sink is configured
async fn event_store(config: &Config, http: reqwest::Client) -> Option<Arc<dyn EventStore>> {
    let es = &config.handlers.elasticsearch;
    if !es.enable {
        return None;
    }
    let mut store = ElasticsearchSink::new(es, http, RetryConfig::from(&config.settings.retry));
    match store.init().await {
        Ok(()) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Event search disabled");
            None
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signals"),
        }
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
