use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 5 * 60;
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Startup configuration, read once from the environment (spec §6.3).
///
/// The original reads `BATCH_USE_KUBE_CONFIG`/`REFRESH_INTERVAL_IN_SECONDS`
/// at module scope as globals; here they're collected into one value at
/// `main` so the rest of the service takes configuration as a parameter
/// instead of reaching for the environment ad hoc.
#[derive(Debug, Clone)]
pub struct Config {
    pub refresh_interval: Duration,
    pub use_kube_config: bool,
    pub namespace: String,
    pub log_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Self {
        let refresh_interval = std::env::var("REFRESH_INTERVAL_IN_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECONDS));

        let use_kube_config = std::env::var("BATCH_USE_KUBE_CONFIG").is_ok();

        let namespace = std::env::var("BATCH_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());

        let log_dir = std::env::var("BATCH_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));

        let bind_addr: SocketAddr = std::env::var("BATCH_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.parse().expect("default bind addr is valid"));

        Config {
            refresh_interval,
            use_kube_config,
            namespace,
            log_dir,
            bind_addr,
        }
    }
}
