//! Key-value storage boundary.
//!
//! All shared state — rollups, realtime windows, heatmap buckets, salts,
//! sites, funnels, goals — lives behind [`KvStore`]. The store offers plain
//! get/set/delete/list semantics and nothing more: no atomic increments, no
//! transactions. The engine is written so that every mutation is a
//! commutative read-modify-write and stays correct (modulo occasional lost
//! updates under heavy same-key contention) on any backend with
//! read-your-writes behaviour.

pub mod keys;
mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Storage interface for all engine state.
///
/// The self-hosted default is [`MemoryStore`]; durable backends (Redis, a
/// blob store, an embedded KV) plug in behind this trait without touching
/// aggregation logic.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    /// List all keys starting with `prefix`, in lexical order.
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

/// JSON helpers layered over the raw string interface.
///
/// Blanket-implemented so every backend gets them for free.
#[async_trait]
pub trait KvStoreExt: KvStore {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}
