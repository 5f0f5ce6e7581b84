//! The realtime active-visitor window.
//!
//! One object per site maps session hash → last heartbeat + current path.
//! A session is active iff `now − last_seen ≤ TTL`; the filter runs at
//! read time, so correctness never depends on when (or whether) expired
//! entries are physically removed. Reads purge opportunistically to keep
//! the object small.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use lumen_store::{keys, KvStoreExt};

use crate::Engine;

/// Stored per session in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPresence {
    pub last_seen_ms: i64,
    pub path: String,
}

pub type RealtimeWindow = BTreeMap<String, SessionPresence>;

/// An active session as reported to the owner.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub session: String,
    pub path: String,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeResult {
    pub active_visitors: u64,
    pub sessions: Vec<ActiveSession>,
}

impl Engine {
    /// Record a heartbeat: unconditionally overwrite the session's
    /// last-seen timestamp and path.
    pub async fn touch_realtime(
        &self,
        site_id: &str,
        session: &str,
        path: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let key = keys::realtime(site_id);
        self.read_modify_write(&key, |window: &mut RealtimeWindow| {
            window.insert(
                session.to_string(),
                SessionPresence {
                    last_seen_ms: at.timestamp_millis(),
                    path: path.to_string(),
                },
            );
        })
        .await
    }

    /// Sessions currently on the site, TTL-filtered at read time.
    pub async fn active_visitors(&self, site_id: &str, now: DateTime<Utc>) -> Result<RealtimeResult> {
        let key = keys::realtime(site_id);
        let window: RealtimeWindow = self.store.get_json(&key).await?.unwrap_or_default();

        let ttl_ms = self.config.realtime_ttl_secs as i64 * 1000;
        let cutoff_ms = now.timestamp_millis() - ttl_ms;

        let (live, expired): (RealtimeWindow, RealtimeWindow) = window
            .into_iter()
            .partition(|(_, presence)| presence.last_seen_ms >= cutoff_ms);

        // Lazy purge: best-effort, never load-bearing. A racing heartbeat
        // may be overwritten here; it re-registers on its next beat.
        if !expired.is_empty() {
            if let Err(error) = self.store.set_json(&key, &live).await {
                warn!(%error, site_id, "realtime window purge write failed");
            }
        }

        let mut sessions: Vec<ActiveSession> = live
            .into_iter()
            .map(|(session, presence)| ActiveSession {
                session,
                path: presence.path,
                last_seen_ms: presence.last_seen_ms,
            })
            .collect();
        sessions.sort_by(|a, b| b.last_seen_ms.cmp(&a.last_seen_ms));

        Ok(RealtimeResult {
            active_visitors: sessions.len() as u64,
            sessions,
        })
    }
}
