//! Periodic background sweeps (§4.10). Shaped like the teacher's
//! `delivery::init_delivery_worker` / `idempotency::init_expiry_worker`
//! loops, generalized with a Postgres advisory-lock-backed cross-replica
//! guard in `init` since a real deployment runs more than one instance.

pub mod init;
pub mod metrics_worker;
pub mod sync_worker;
