use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::warn;

use lumen_core::{
    config::Config,
    patterns::{PatternConfig, Patterns},
};
use lumen_engine::Engine;
use lumen_store::KvStore;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn KvStore>,
    pub config: Arc<Config>,
    /// Bot-signature and PII-detector set, loaded once at startup.
    pub patterns: Arc<Patterns>,

    /// Per-IP sliding-window rate limiter for POST /api/collect.
    ///
    /// Key: IP address string. Value: deque of request timestamps within
    /// the last 60 seconds. Limit: 60 requests per IP per window.
    rate_limiter: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>, config: Config) -> Self {
        let patterns = load_patterns(&config);
        Self {
            engine: Arc::new(Engine::new(Arc::clone(&store), config.clone())),
            store,
            config: Arc::new(config),
            patterns: Arc::new(patterns),
            rate_limiter: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `ip` is within the 60 req/min rate limit.
    ///
    /// Returns `true` if the request should proceed, `false` if it should
    /// be rejected with 429. Slides the window on every call.
    pub async fn check_rate_limit(&self, ip: &str) -> bool {
        if self.config.rate_limit_disable {
            return true;
        }
        let mut map = self.rate_limiter.lock().await;
        let window = map.entry(ip.to_string()).or_default();
        let cutoff = Instant::now() - std::time::Duration::from_secs(60);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        if window.len() >= 60 {
            return false;
        }
        window.push_back(Instant::now());
        true
    }
}

/// Load the pattern set from `LUMEN_PATTERNS_PATH`, falling back to the
/// compiled-in defaults on any failure.
fn load_patterns(config: &Config) -> Patterns {
    let Some(path) = config.patterns_path.as_deref() else {
        return Patterns::default_set();
    };
    let loaded = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| PatternConfig::from_json(&raw))
        .and_then(Patterns::compile);
    match loaded {
        Ok(patterns) => {
            tracing::info!(path, version = patterns.version, "Pattern set loaded");
            patterns
        }
        Err(error) => {
            warn!(%error, path, "Pattern set failed to load — using compiled-in defaults");
            Patterns::default_set()
        }
    }
}
