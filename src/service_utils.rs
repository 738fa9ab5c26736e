use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "mqtt_sniffer=warn";
const CLIENT_ID_PREFIX: &str = "rcboat_sniffer_";

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Diagnostics go to stderr so they never interleave with the message feed.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Must run before any other thread exists, otherwise `time` refuses to read
/// the local offset and timestamps fall back to UTC.
pub fn capture_local_offset() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let _ = LOCAL_OFFSET.set(offset);
}

/// Console timestamp, `YYYY-MM-DD HH:MM:SS` in local time.
pub fn timestamp() -> String {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    format_timestamp(OffsetDateTime::now_utc().to_offset(offset))
}

pub fn format_timestamp(moment: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    moment
        .format(&format)
        .unwrap_or_else(|_| moment.unix_timestamp().to_string())
}

pub fn default_client_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{}{}", CLIENT_ID_PREFIX, secs)
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

/// Resolves once the operator asks the process to stop. If no handler can
/// be installed the future never resolves and the session runs until killed.
pub async fn handle_shutdown() {
    if let Err(e) = wait_for_shutdown_signal().await {
        error!("Failed to handle termination signal: {:?}", e);
        std::future::pending::<()>().await;
    }
}
