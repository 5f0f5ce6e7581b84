use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Width of the coarse session window in seconds. A visitor idle for longer
/// than this maps to a fresh session hash.
pub const SESSION_WINDOW_SECS: i64 = 1800;

/// Compute a visitor identity hash from coarse connection attributes.
///
/// Formula: sha256(day_salt + site_id + ip + user_agent)[0..8] encoded as
/// 16 hex chars. The salt is scoped to one UTC day, so the same visitor
/// hashes identically within a day (same-day dedup and session grouping)
/// and to an unrelated value the next day (no cross-day linkage). The raw
/// IP and user-agent exist only for the duration of this call.
pub fn identity_hash(day_salt: &str, site_id: &str, ip: &str, user_agent: &str) -> String {
    let input = format!("{day_salt}{site_id}{ip}{user_agent}");
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..8])
}

/// Derive a session hash from an identity hash and a coarse time window.
///
/// Sessions inherit the identity hash's day scoping; the window index adds
/// 30-minute granularity so one visitor produces a new session after half
/// an hour of inactivity.
pub fn session_hash(identity_hash: &str, window: i64) -> String {
    let input = format!("{identity_hash}{window}");
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..8])
}

/// The coarse window index for a timestamp.
pub fn session_window(at: DateTime<Utc>) -> i64 {
    at.timestamp() / SESSION_WINDOW_SECS
}
