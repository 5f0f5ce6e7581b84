//! The analytics aggregation engine.
//!
//! Ingestion folds validated events into per-day rollups, heatmap buckets,
//! activity sequences and the realtime window; queries merge those objects
//! back together. The engine holds no state of its own beyond a per-process
//! salt cache — everything shared lives in the [`KvStore`], and every
//! mutation is a commutative read-modify-write (see `lumen-core::rollup`).
//!
//! Concurrent folds against the same key may race; the accepted outcome is
//! a lost update overwritten by a later fold that re-read current state.
//! Occasional undercounting under extreme write pressure on one key is a
//! documented tradeoff, not a correctness violation.

pub mod funnel;
pub mod goal;
pub mod heatmap;
pub mod ingest;
pub mod range;
pub mod realtime;
pub mod salt;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use lumen_core::config::Config;
use lumen_store::KvStore;

pub struct Engine {
    store: Arc<dyn KvStore>,
    config: Config,
    /// Read-through cache of daily salts, keyed by UTC date.
    salt_cache: RwLock<HashMap<NaiveDate, String>>,
}

impl Engine {
    pub fn new(store: Arc<dyn KvStore>, config: Config) -> Self {
        Self {
            store,
            config,
            salt_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
