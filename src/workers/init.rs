//! Cross-replica coordination and the two tickers' entry points. Shaped
//! like the teacher's `idempotency::init_expiry_worker` — a sleep-and-loop
//! function handed straight to `tokio::spawn` from `main.rs` — generalized
//! with a Postgres advisory lock (`pg_try_advisory_lock`) so two replicas
//! never run the same worker's cycle at once (§9's single-instance-
//! assumption redesign flag; REDIS_URL is optional so the lock can't live
//! in Redis the way the original names it).

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::services::Services;
use crate::workers::metrics_worker;
use crate::workers::sync_worker;

const METRICS_WORKER_TICK: Duration = Duration::from_secs(60);
const SYNC_WORKER_TICK: Duration = Duration::from_secs(20 * 60);

/// Stable i64 key for `pg_try_advisory_lock`, derived from the worker name
/// the same way the lock comment in SPEC_FULL describes it: a hash of a
/// fixed label, not of anything request-scoped.
fn advisory_lock_key(label: &str) -> i64 {
    use std::hash::Hash;
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    label.hash(&mut hasher);
    hasher.finish() as i64
}

async fn try_acquire_cluster_lock(pool: &PgPool, label: &str) -> Result<bool, sqlx::Error> {
    let key = advisory_lock_key(label);
    let row = sqlx::query!("SELECT pg_try_advisory_lock($1) as \"locked!\"", key)
        .fetch_one(pool)
        .await?;
    Ok(row.locked)
}

async fn release_cluster_lock(pool: &PgPool, label: &str) -> Result<(), sqlx::Error> {
    let key = advisory_lock_key(label);
    sqlx::query!("SELECT pg_advisory_unlock($1)", key)
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// §5: "the metrics worker runs one cycle at a time" — an in-process flag
/// skips overlapping ticks within this replica, on top of the cross-replica
/// advisory lock.
pub async fn init_metrics_worker(services: Arc<Services>) -> Result<(), anyhow::Error> {
    let cycle_active = Arc::new(AtomicBool::new(false));
    loop {
        tokio::time::sleep(METRICS_WORKER_TICK).await;

        if cycle_active.swap(true, Ordering::SeqCst) {
            continue;
        }
        let guard = CycleGuard { flag: cycle_active.clone() };

        match try_acquire_cluster_lock(&services.pool, "metrics_worker").await {
            Ok(true) => {
                let result = metrics_worker::run_cycle(&services).await;
                if let Err(e) = release_cluster_lock(&services.pool, "metrics_worker").await {
                    tracing::warn!(error = %e, "failed to release metrics worker advisory lock");
                }
                match result {
                    Ok(()) => {
                        let _ = crate::store::worker_status::record_success(&services.pool, "metrics_worker").await;
                    }
                    Err(e) => {
                        tracing::error!(error.cause_chain = ?e, error.message = %e, "metrics worker cycle failed");
                        let _ = crate::store::worker_status::record_failure(
                            &services.pool,
                            "metrics_worker",
                            &e.to_string(),
                        )
                        .await;
                    }
                }
            }
            Ok(false) => {
                tracing::debug!("another replica holds the metrics worker lock, skipping tick");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire metrics worker advisory lock");
            }
        }
        drop(guard);
    }
}

/// Platform sync driver (§4.10): 20 min tick, one cluster-wide lock per
/// cycle plus a 10-min per-adapter lock inside `sync_worker::run_cycle`.
pub async fn init_sync_worker(services: Arc<Services>) -> Result<(), anyhow::Error> {
    loop {
        tokio::time::sleep(SYNC_WORKER_TICK).await;

        match try_acquire_cluster_lock(&services.pool, "platform_sync").await {
            Ok(true) => {
                let result = sync_worker::run_cycle(&services).await;
                if let Err(e) = release_cluster_lock(&services.pool, "platform_sync").await {
                    tracing::warn!(error = %e, "failed to release sync worker advisory lock");
                }
                if let Err(e) = result {
                    tracing::error!(error.cause_chain = ?e, error.message = %e, "sync worker cycle failed");
                }
            }
            Ok(false) => {
                tracing::debug!("another replica holds the platform sync lock, skipping tick");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire platform sync advisory lock");
            }
        }
    }
}

struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_lock_key_is_stable_for_the_same_label() {
        assert_eq!(advisory_lock_key("metrics_worker"), advisory_lock_key("metrics_worker"));
        assert_ne!(advisory_lock_key("metrics_worker"), advisory_lock_key("platform_sync"));
    }
}
