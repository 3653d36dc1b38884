//! Background expiry sweep.
//!
//! Expired records are already rejected on read; the sweep only bounds
//! memory. Each store is swept independently so one failing store does not
//! stop the others.

use std::sync::Arc;
use std::time::Duration;

use crate::AuthResult;
use crate::storage::{
    CodeStorage, JtiStorage, RefreshTokenStorage, RevokedTokenStorage, StateStorage,
};

/// Stores swept on every tick.
#[derive(Clone)]
pub struct SweepTargets {
    /// Authorization codes.
    pub codes: Arc<dyn CodeStorage>,

    /// CSRF states.
    pub states: Arc<dyn StateStorage>,

    /// DPoP proof `jti` cache.
    pub jti: Arc<dyn JtiStorage>,

    /// Refresh tokens and their families.
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,

    /// Revoked access tokens.
    pub revoked_tokens: Arc<dyn RevokedTokenStorage>,
}

/// Counts of records removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Authorization codes removed.
    pub codes: u64,
    /// CSRF states removed.
    pub states: u64,
    /// DPoP `jti` entries removed.
    pub jti: u64,
    /// Refresh tokens removed.
    pub refresh_tokens: u64,
    /// Revocation list entries removed.
    pub revoked_tokens: u64,
}

impl SweepReport {
    /// Total records removed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.codes + self.states + self.jti + self.refresh_tokens + self.revoked_tokens
    }
}

impl SweepTargets {
    /// Runs one sweep over every store.
    ///
    /// A store that fails is logged and counted as zero.
    pub async fn sweep(&self) -> SweepReport {
        SweepReport {
            codes: swept("codes", self.codes.cleanup_expired().await),
            states: swept("states", self.states.cleanup_expired().await),
            jti: swept("dpop_jti", self.jti.cleanup_expired().await),
            refresh_tokens: swept(
                "refresh_tokens",
                self.refresh_tokens.cleanup_expired().await,
            ),
            revoked_tokens: swept(
                "revoked_tokens",
                self.revoked_tokens.cleanup_expired().await,
            ),
        }
    }
}

fn swept(store: &'static str, result: AuthResult<u64>) -> u64 {
    match result {
        Ok(removed) => removed,
        Err(e) => {
            tracing::warn!(store, error = %e, "Expiry sweep failed");
            0
        }
    }
}

/// Starts the background sweep task.
///
/// The first sweep runs one `interval` after start. Abort the returned handle
/// to stop it.
#[must_use]
pub fn spawn_sweeper(targets: SweepTargets, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval = ?interval, "Expiry sweeper started");

        loop {
            ticker.tick().await;

            let report = targets.sweep().await;
            if report.total() > 0 {
                tracing::debug!(
                    codes = report.codes,
                    states = report.states,
                    jti = report.jti,
                    refresh_tokens = report.refresh_tokens,
                    revoked_tokens = report.revoked_tokens,
                    "Expiry sweep completed"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::storage::memory::{
        InMemoryCodeStorage, InMemoryJtiStorage, InMemoryRefreshTokenStorage,
        InMemoryRevokedTokenStorage, InMemoryStateStorage,
    };

    fn targets() -> (SweepTargets, Arc<InMemoryJtiStorage>, Arc<InMemoryRevokedTokenStorage>) {
        let jti = Arc::new(InMemoryJtiStorage::new());
        let revoked = Arc::new(InMemoryRevokedTokenStorage::new());
        let targets = SweepTargets {
            codes: Arc::new(InMemoryCodeStorage::new()),
            states: Arc::new(InMemoryStateStorage::new()),
            jti: jti.clone(),
            refresh_tokens: Arc::new(InMemoryRefreshTokenStorage::new()),
            revoked_tokens: revoked.clone(),
        };
        (targets, jti, revoked)
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let (targets, jti, revoked) = targets();
        let past = OffsetDateTime::now_utc() - time::Duration::seconds(5);
        let future = OffsetDateTime::now_utc() + time::Duration::minutes(5);

        jti.mark_used("old", past).await.unwrap();
        jti.mark_used("fresh", future).await.unwrap();
        revoked.revoke("old-jti", past).await.unwrap();

        let report = targets.sweep().await;
        assert_eq!(report.jti, 1);
        assert_eq!(report.revoked_tokens, 1);
        assert_eq!(report.total(), 2);

        assert!(jti.is_used("fresh").await.unwrap());
        assert_eq!(targets.sweep().await.total(), 0);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_on_interval() {
        let (targets, jti, _) = targets();
        let past = OffsetDateTime::now_utc() - time::Duration::seconds(5);
        jti.mark_used("old", past).await.unwrap();

        let handle = spawn_sweeper(targets.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert_eq!(targets.jti.cleanup_expired().await.unwrap(), 0);
    }
}
