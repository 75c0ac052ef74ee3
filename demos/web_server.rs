//! REST API server example
//!
//! Runs udown with the REST API enabled. After starting, you can:
//! - View Swagger UI at http://localhost:5000/swagger-ui
//! - Start a download via POST http://localhost:5000/downloads
//! - Stream a job's progress via GET http://localhost:5000/jobs/<id>/events
//! - Serialize version folders via POST http://localhost:5000/format
//!
//! `UDOWN_HOST`, `UDOWN_PORT`, `UDOWN_OUTPUT_DIR` and `UDOWN_YTDLP` override
//! the defaults; `RUST_LOG` controls log output.

use tracing_subscriber::EnvFilter;
use udown::api::start_api_server;
use udown::{Config, JobManager, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,udown=debug")))
        .init();

    let mut config = Config::default();
    config.apply_env();
    let address = config.server.api.bind_address;

    let manager = JobManager::new(config).await?;

    println!("Starting udown REST API server");
    println!("Swagger UI: http://{address}/swagger-ui");
    println!();
    println!("Example commands:");
    println!("  # Start a playlist download");
    println!("  curl -X POST http://{address}/downloads \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"source\": \"https://www.youtube.com/playlist?list=...\", \"quality\": \"720p\"}}'");
    println!();
    println!("  # Follow its progress (Server-Sent Events)");
    println!("  curl -N http://{address}/jobs/<job_id>/events");
    println!();
    println!("  # Serialize Version_1..Version_7 into one folder");
    println!("  curl -X POST http://{address}/format \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"source_root\": \"music\", \"target_root\": \"serialized\"}}'");
    println!();

    let server = tokio::spawn(start_api_server(manager.clone()));
    run_with_shutdown(manager).await?;
    server.await??;

    Ok(())
}
