pub mod adapters;
pub mod classifier;
pub mod configuration;
pub mod correlation;
pub mod domain;
pub mod event_store;
pub mod gate;
pub mod healing;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod ops;
pub mod policy;
pub mod queue;
pub mod routes;
pub mod services;
pub mod startup;
pub mod state_machine;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod utils;
pub mod workers;
