//! Bot-signature and PII-detector pattern sets.
//!
//! Both sets are injected configuration rather than hardcoded logic: the
//! server loads a versioned JSON document at startup (falling back to the
//! compiled-in defaults) so signatures can evolve without touching the
//! aggregation engine.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Raw, serialisable pattern-set document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub version: u32,
    /// Lowercase substrings matched against the user-agent.
    pub bot_signatures: Vec<String>,
    pub pii_detectors: Vec<PiiDetectorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiDetectorConfig {
    pub name: String,
    pub pattern: String,
}

impl PatternConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid pattern-set document")
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        let bot_signatures = [
            // Crawlers and SEO bots.
            "bot",
            "spider",
            "crawler",
            "googlebot",
            "bingbot",
            "duckduckbot",
            "yandexbot",
            "baiduspider",
            "ahrefsbot",
            "semrushbot",
            "mj12bot",
            // Headless browsers and scripted clients.
            "headlesschrome",
            "phantomjs",
            "python-requests",
            "curl/",
            "wget/",
            "go-http-client",
            "libwww-perl",
            "urllib",
            "httpclient",
            // AI fetchers.
            "gptbot",
            "oai-searchbot",
            "chatgpt-user",
            "claudebot",
            "claude-web",
            "ccbot",
            "perplexitybot",
            "bytespider",
            "amazonbot",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let pii_detectors = vec![
            PiiDetectorConfig {
                name: "ipv4".to_string(),
                pattern: r"\b(?:\d{1,3}\.){3}\d{1,3}\b".to_string(),
            },
            PiiDetectorConfig {
                name: "ipv6".to_string(),
                pattern: r"\b(?:[0-9a-fA-F]{1,4}:){3,7}[0-9a-fA-F]{1,4}\b".to_string(),
            },
            PiiDetectorConfig {
                name: "email".to_string(),
                pattern: r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}".to_string(),
            },
            PiiDetectorConfig {
                name: "phone".to_string(),
                pattern: r"\+?[0-9][0-9 ().-]{8,}[0-9]".to_string(),
            },
        ];

        Self {
            version: 1,
            bot_signatures,
            pii_detectors,
        }
    }
}

/// Compiled pattern set ready for the hot ingestion path.
#[derive(Debug)]
pub struct Patterns {
    pub version: u32,
    bot_signatures: Vec<String>,
    pii_detectors: Vec<(String, Regex)>,
}

impl Patterns {
    pub fn compile(config: PatternConfig) -> Result<Self> {
        let bot_signatures = config
            .bot_signatures
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();
        let mut pii_detectors = Vec::with_capacity(config.pii_detectors.len());
        for detector in config.pii_detectors {
            let regex = Regex::new(&detector.pattern)
                .with_context(|| format!("invalid PII pattern {:?}", detector.name))?;
            pii_detectors.push((detector.name, regex));
        }
        Ok(Self {
            version: config.version,
            bot_signatures,
            pii_detectors,
        })
    }

    pub fn default_set() -> Self {
        // The compiled-in defaults are valid regexes; a failure here is a
        // programming error caught by the test suite.
        #[allow(clippy::expect_used)]
        Self::compile(PatternConfig::default()).expect("default pattern set compiles")
    }

    /// Substring match against the lowercased user-agent.
    pub fn is_bot(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_ascii_lowercase();
        self.bot_signatures.iter().any(|sig| ua.contains(sig))
    }

    /// Scan free text for PII; returns the name of the first matching
    /// detector.
    pub fn find_pii(&self, text: &str) -> Option<&str> {
        self.pii_detectors
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(name, _)| name.as_str())
    }
}
