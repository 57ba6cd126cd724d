use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

use tokio::task::JoinError;

use deliverability_engine::configuration::get_configuration;
use deliverability_engine::queue;
use deliverability_engine::services::Services;
use deliverability_engine::startup::Application;
use deliverability_engine::telemetry::get_subscriber;
use deliverability_engine::telemetry::init_subscriber;
use deliverability_engine::workers;

fn report_exit(name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{name} failed (inner)"
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{name} failed (outer)"
            )
        }
    }
}

/// Initialise telemetry, load config, and start the server and its three
/// background workers (work queue, metrics sweep, platform sync).
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("deliverability_engine", "info", std::io::stdout);
    init_subscriber(subscriber);

    let cfg = get_configuration()?;
    let application = Application::build(cfg).await?;
    let services = application.services();

    let server = application.run_until_stopped();
    let queue_worker = run_queue_worker(services.clone());
    let metrics_worker = workers::init::init_metrics_worker(services.clone());
    let sync_worker = workers::init::init_sync_worker(services);

    let server_thread = tokio::spawn(server);
    let queue_thread = tokio::spawn(queue_worker);
    let metrics_thread = tokio::spawn(metrics_worker);
    let sync_thread = tokio::spawn(sync_worker);

    tokio::select! {
        o = server_thread => { report_exit("API", o.map(|r| r.map_err(anyhow::Error::from))) },
        o = queue_thread => { report_exit("Work queue worker", o) },
        o = metrics_thread => { report_exit("Metrics worker", o) },
        o = sync_thread => { report_exit("Platform sync worker", o) },
    }

    Ok(())
}

/// `queue::run_queue_worker` never returns an error itself (failures are
/// accounted per-job); wrapped here so it fits the same `report_exit` shape
/// as the fallible workers.
async fn run_queue_worker(services: Arc<Services>) -> Result<(), anyhow::Error> {
    queue::run_queue_worker(services).await;
    Ok(())
}
