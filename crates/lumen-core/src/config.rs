#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub geoip_path: String,
    pub cors_origins: Vec<String>,
    /// Development mode: the origin check additionally accepts localhost.
    pub dev_mode: bool,
    /// Seconds a session stays "active" after its last heartbeat.
    pub realtime_ttl_secs: u64,
    /// Days a cross-day first-seen marker stays valid for new-vs-returning
    /// classification.
    pub visitor_retention_days: u32,
    /// Raw click points kept per heatmap bucket before summarization into
    /// the density grid.
    pub heatmap_point_cap: usize,
    /// Per-session max-depth samples kept per scroll bucket.
    pub heatmap_sample_cap: usize,
    /// Activity entries kept per session for funnel evaluation.
    pub activity_entry_cap: usize,
    /// Optional path to a JSON pattern-set document overriding the
    /// compiled-in bot/PII defaults.
    pub patterns_path: Option<String>,
    pub rate_limit_disable: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("LUMEN_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            geoip_path: std::env::var("LUMEN_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            cors_origins: std::env::var("LUMEN_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            dev_mode: std::env::var("LUMEN_DEV")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            realtime_ttl_secs: std::env::var("LUMEN_REALTIME_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            visitor_retention_days: std::env::var("LUMEN_VISITOR_RETENTION_DAYS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .unwrap_or(90),
            heatmap_point_cap: std::env::var("LUMEN_HEATMAP_POINT_CAP")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            heatmap_sample_cap: std::env::var("LUMEN_HEATMAP_SAMPLE_CAP")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            activity_entry_cap: std::env::var("LUMEN_ACTIVITY_ENTRY_CAP")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            patterns_path: std::env::var("LUMEN_PATTERNS_PATH").ok(),
            rate_limit_disable: std::env::var("LUMEN_RATE_LIMIT_DISABLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

impl Default for Config {
    /// Defaults used by the test suite; mirrors `from_env` with no
    /// environment set.
    fn default() -> Self {
        Self {
            port: 3000,
            geoip_path: "./GeoLite2-City.mmdb".to_string(),
            cors_origins: vec![],
            dev_mode: false,
            realtime_ttl_secs: 300,
            visitor_retention_days: 90,
            heatmap_point_cap: 1000,
            heatmap_sample_cap: 500,
            activity_entry_cap: 100,
            patterns_path: None,
            rate_limit_disable: false,
        }
    }
}
