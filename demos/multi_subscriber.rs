//! Multiple observers of one job
//!
//! Every subscriber receives the job's whole event history, including one that
//! attaches after the job has finished.
//!
//! ```bash
//! cargo run --example multi_subscriber -- "https://www.youtube.com/playlist?list=..."
//! ```

use tracing_subscriber::EnvFilter;
use udown::{Config, DownloadRequest, Event, JobManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let source = std::env::args()
        .nth(1)
        .ok_or("usage: multi_subscriber <playlist url>")?;

    let mut config = Config::default();
    config.apply_env();
    let manager = JobManager::new(config).await?;
    let id = manager.submit(DownloadRequest::new(source)).await?;

    // Subscriber 1: progress display
    let mut progress = manager.subscribe(id).await?;
    let display = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            match event {
                Event::NewItem { title } => println!("[display] > {title}"),
                Event::Progress { percent, .. } => println!("[display]   {percent:5.1}%"),
                Event::Error { message, .. } => println!("[display] failed: {message}"),
                Event::Finished => println!("[display] done"),
                Event::Log { .. } => {}
            }
        }
    });

    // Subscriber 2: log everything
    let mut log = manager.subscribe(id).await?;
    let logger = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(event) = log.recv().await {
            if let Event::Log { line } = &event {
                println!("[log] {line}");
            }
            count += 1;
        }
        count
    });

    display.await?;
    let live = logger.await?;

    // Subscriber 3: attaches after the job ended and still sees every event
    let mut late = manager.subscribe(id).await?;
    let mut replayed = 0usize;
    while late.recv().await.is_some() {
        replayed += 1;
    }
    println!("live subscriber saw {live} events, late subscriber {replayed}");

    manager.shutdown().await?;
    Ok(())
}
