use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use aura_gate::config::GateConfig;
use aura_gate::flip::FlipQuota;
use aura_gate::http::{guard, router, shutdown_signal, HttpServer};

/// Log output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "aura-gate")]
#[command(about = "Per-client request quotas in front of the aura API")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    info!("Starting Aura Gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    info!(
        http_addr = %config.server.http_addr,
        default_max_requests = config.rate_limiting.rules.default.max_requests,
        default_window_ms = config.rate_limiting.rules.default.window_ms,
        endpoint_rules = config.rate_limiting.rules.endpoints.len(),
        max_flips_per_day = config.flips.max_flips_per_day,
        "Configuration loaded"
    );

    let guard = guard(&config);
    let flips = Arc::new(FlipQuota::new(config.flips));

    #[cfg(unix)]
    if let Some(path) = args.config.clone() {
        tokio::spawn(reload_rules_on_hangup(path, guard.clone()));
    }

    let server = HttpServer::bind(config.server.http_addr, router(guard, flips)).await?;

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Aura Gate stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Reload endpoint quota rules from `path` whenever SIGHUP arrives.
///
/// A file that fails to load leaves the current rules in place.
#[cfg(unix)]
async fn reload_rules_on_hangup(path: PathBuf, guard: aura_gate::http::QuotaGuard) {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::error;

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!(error = %e, "Failed to install SIGHUP handler, rule reload disabled");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!(path = %path.display(), "Received SIGHUP, reloading quota rules");
        match GateConfig::load(Some(&path)) {
            Ok(config) => guard.set_rules(config.rate_limiting.rules),
            Err(e) => error!(error = %e, "Quota rule reload failed, keeping current rules"),
        }
    }
}
