use std::env;

use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use index_sync::{Dependencies, IndexingError, Settings};

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let settings = Settings::from_env()?;
    let dependencies = Dependencies::new(&settings).await?;
    let synchronizer = dependencies.synchronizer;

    tokio::select! {
        result = synchronizer.synchronize(settings.query()) => {
            match result {
                Ok(report) => {
                    info!(
                        index = %report.index,
                        started_at = %report.started_at.to_rfc3339(),
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        queued = report.queued,
                        filtered = report.filtered,
                        dropped = report.dropped,
                        sent = report.sent,
                        failed_batches = report.failed_batches,
                        "Synchronization complete"
                    );
                    if report.failed_batches > 0 {
                        warn!(
                            failed_operations = report.failed_operations,
                            "Some bulk writes failed"
                        );
                    }
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "Synchronization failed");
                    Err(e.into())
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    }
}
