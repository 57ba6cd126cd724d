//! Typed persistence (component K). One module per table, each a thin set
//! of `sqlx::query!` calls returning `crate::model` rows — no query
//! builder, no ORM, matching the teacher's direct-SQL style throughout
//! `idempotency/persistence.rs` and `delivery.rs`.

pub mod audit;
pub mod campaigns;
pub mod dead_letter;
pub mod domains;
pub mod leads;
pub mod mailbox_metrics;
pub mod mailboxes;
pub mod notifications;
pub mod organizations;
pub mod queue;
pub mod raw_events;
pub mod transitions;
pub mod worker_status;
