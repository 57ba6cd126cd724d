//! Platform sync driver (§4.10): for every organization with at least one
//! configured adapter, pull recent activity via `PlatformAdapter::sync`.
//! Per-adapter isolation is a 10-minute Postgres advisory lock keyed by
//! `("sync", adapter_name)`, separate from the 20-minute cluster-wide lock
//! `init::init_sync_worker` already holds for the cycle itself — a stuck
//! adapter blocks only itself, not the whole driver.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::adapters::PlatformAdapter;
use crate::domain::NotificationSeverity;
use crate::services::Services;
use crate::store;

const INTER_CALL_DELAY: Duration = Duration::from_secs(2);
const CRITICAL_FAILURE_THRESHOLD: i32 = 3;

pub async fn run_cycle(services: &Services) -> Result<(), anyhow::Error> {
    let orgs = store::organizations::list_all(&services.pool).await?;
    for adapter in &services.adapters {
        if !services.circuit_breakers.should_allow(adapter.name()) {
            tracing::warn!(adapter = adapter.name(), "circuit open, skipping this cycle");
            continue;
        }
        if !acquire_adapter_lock(&services.pool, adapter.name()).await? {
            tracing::debug!(adapter = adapter.name(), "another replica holds this adapter's sync lock");
            continue;
        }

        for org in &orgs {
            sync_one(services, adapter.as_ref(), org.id).await;
            tokio::time::sleep(INTER_CALL_DELAY).await;
        }

        release_adapter_lock(&services.pool, adapter.name()).await?;
    }
    Ok(())
}

async fn sync_one(services: &Services, adapter: &dyn PlatformAdapter, organization_id: Uuid) {
    match adapter.sync(organization_id).await {
        Ok(report) => {
            services.circuit_breakers.record_success(adapter.name());
            let _ = store::worker_status::record_success(&services.pool, &worker_name(adapter.name())).await;
            tracing::info!(
                adapter = adapter.name(),
                organization_id = %organization_id,
                leads_synced = report.leads_synced,
                bounces_ingested = report.bounces_ingested,
                "platform sync complete"
            );
        }
        Err(e) => {
            services.circuit_breakers.record_failure(adapter.name());
            let failures = store::worker_status::record_failure(
                &services.pool,
                &worker_name(adapter.name()),
                &e.to_string(),
            )
            .await
            .unwrap_or(0);
            tracing::warn!(
                adapter = adapter.name(),
                organization_id = %organization_id,
                error = %e,
                consecutive_failures = failures,
                "platform sync failed"
            );
            if failures >= CRITICAL_FAILURE_THRESHOLD {
                let _ = store::notifications::notify(
                    &services.pool,
                    organization_id,
                    None,
                    NotificationSeverity::Critical,
                    &format!("platform sync for {} has failed {failures} times in a row", adapter.name()),
                    Some(&format!("sync-failure:{}", adapter.name())),
                )
                .await;
            }
        }
    }
}

fn worker_name(adapter_name: &str) -> String {
    format!("platform_sync:{adapter_name}")
}

async fn acquire_adapter_lock(pool: &PgPool, adapter_name: &str) -> Result<bool, sqlx::Error> {
    let key = adapter_lock_key(adapter_name);
    let row = sqlx::query!("SELECT pg_try_advisory_lock($1) as \"locked!\"", key)
        .fetch_one(pool)
        .await?;
    Ok(row.locked)
}

async fn release_adapter_lock(pool: &PgPool, adapter_name: &str) -> Result<(), sqlx::Error> {
    let key = adapter_lock_key(adapter_name);
    sqlx::query!("SELECT pg_advisory_unlock($1)", key)
        .fetch_one(pool)
        .await?;
    Ok(())
}

fn adapter_lock_key(adapter_name: &str) -> i64 {
    use std::hash::Hash;
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    ("sync", adapter_name).hash(&mut hasher);
    hasher.finish() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_threshold_matches_the_spec_constant() {
        assert_eq!(CRITICAL_FAILURE_THRESHOLD, 3);
    }

    #[test]
    fn lock_key_differs_per_adapter() {
        assert_ne!(adapter_lock_key("instantly"), adapter_lock_key("smartlead"));
    }
}
