use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::{SessionLocks, SessionStats, SessionStore};

/// Which sessions the sweeper removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Keep everything for the process lifetime.
    Unbounded,
    /// Keep the most recently updated sessions.
    MaxSessions(usize),
    /// Remove sessions idle for longer than this.
    Ttl(Duration),
    Both { max_sessions: usize, ttl: Duration },
}

impl EvictionPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        match (config.max_sessions, config.ttl_secs) {
            (None, None) => Self::Unbounded,
            (Some(max), None) => Self::MaxSessions(max),
            (None, Some(ttl)) => Self::Ttl(Duration::from_secs(ttl)),
            (Some(max_sessions), Some(ttl)) => Self::Both {
                max_sessions,
                ttl: Duration::from_secs(ttl),
            },
        }
    }

    /// Ids to evict, oldest first.
    pub fn select(&self, mut sessions: Vec<SessionStats>, now: DateTime<Utc>) -> Vec<String> {
        let (max, ttl) = match self {
            Self::Unbounded => return Vec::new(),
            Self::MaxSessions(max) => (Some(*max), None),
            Self::Ttl(ttl) => (None, Some(*ttl)),
            Self::Both { max_sessions, ttl } => (Some(*max_sessions), Some(*ttl)),
        };

        sessions.sort_by_key(|s| s.updated_at);
        let mut evict = Vec::new();

        let cutoff = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_sub_signed(ttl));
        if let Some(cutoff) = cutoff {
            let expired = sessions.iter().take_while(|s| s.updated_at < cutoff).count();
            evict.extend(sessions.drain(..expired).map(|s| s.id));
        }
        if let Some(max) = max {
            let excess = sessions.len().saturating_sub(max);
            evict.extend(sessions.drain(..excess).map(|s| s.id));
        }

        evict
    }
}

/// Apply the policy once. Sessions with a turn in flight are skipped.
pub async fn sweep(
    store: &dyn SessionStore,
    policy: &EvictionPolicy,
    locks: &SessionLocks,
) -> Result<usize> {
    if *policy == EvictionPolicy::Unbounded {
        return Ok(0);
    }

    let candidates = policy.select(store.list().await?, Utc::now());
    let mut removed = 0;
    for id in candidates {
        let Ok(_guard) = locks.try_acquire(&id) else {
            debug!("Session {} is busy, not evicting", id);
            continue;
        };
        if store.remove(&id).await? {
            removed += 1;
        }
    }
    locks.prune();

    if removed > 0 {
        info!("Evicted {} session(s)", removed);
    }
    Ok(removed)
}

/// Run [`sweep`] every `interval` until the returned handle is aborted.
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    policy: EvictionPolicy,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if policy == EvictionPolicy::Unbounded {
        return None;
    }
    info!("Session sweeper started: {:?} every {:?}", policy, interval);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep(store.as_ref(), &policy, &locks).await {
                warn!("Session sweep failed: {}", e);
            }
        }
    }))
}
