//! Daily salt provisioning.
//!
//! The salt is a function of the UTC date, backed by the store, with a
//! per-process read-through cache. Creation is lazy and race-tolerant:
//! two concurrent creators both generate a candidate, both write, and both
//! then re-read — whichever write landed first wins, and from that point
//! every caller observes the same value. The salt never leaves this module
//! except as an opaque hashing key.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rand::RngCore;

use lumen_store::{keys, KvStore};

use crate::Engine;

impl Engine {
    /// The hashing secret for `date`, created on first use.
    ///
    /// Errors propagate to the caller, which must degrade to unattributed
    /// ingestion rather than blocking the event.
    pub async fn daily_salt(&self, date: NaiveDate) -> Result<String> {
        if let Some(salt) = self.salt_cache.read().await.get(&date) {
            return Ok(salt.clone());
        }

        let key = keys::salt(date);
        let salt = match self.store.get(&key).await? {
            Some(existing) => existing,
            None => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                self.store.set(&key, &hex::encode(bytes)).await?;
                // Re-read after the write: if another creator raced us,
                // its value may have landed first and both callers must
                // settle on the stored one.
                self.store
                    .get(&key)
                    .await?
                    .ok_or_else(|| anyhow!("salt write for {date} not readable back"))?
            }
        };

        self.salt_cache
            .write()
            .await
            .insert(date, salt.clone());
        Ok(salt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lumen_core::config::Config;
    use lumen_store::{KvStore, MemoryStore};

    use crate::Engine;

    fn date() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn salt_is_stable_within_a_day() {
        let engine = Engine::new(Arc::new(MemoryStore::new()), Config::default());
        let a = engine.daily_salt(date()).await.unwrap();
        let b = engine.daily_salt(date()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn different_days_get_different_salts() {
        let engine = Engine::new(Arc::new(MemoryStore::new()), Config::default());
        let a = engine.daily_salt(date()).await.unwrap();
        let b = engine
            .daily_salt(date().succ_opt().unwrap())
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn racing_creators_converge_on_the_stored_value() {
        let store = Arc::new(MemoryStore::new());
        // A competing writer landed first.
        store.set("salt:2024-01-15", "already-there").await.unwrap();
        let engine = Engine::new(store, Config::default());
        assert_eq!(engine.daily_salt(date()).await.unwrap(), "already-there");
    }

    #[tokio::test]
    async fn two_engines_share_one_salt() {
        // Two stateless handler processes against the same store must hash
        // identically for the same day.
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let a = Engine::new(store.clone(), Config::default());
        let b = Engine::new(store, Config::default());
        assert_eq!(
            a.daily_salt(date()).await.unwrap(),
            b.daily_salt(date()).await.unwrap()
        );
    }
}
