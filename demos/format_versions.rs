//! Version formatter example
//!
//! Merges `<root>/Version_<start>` .. `<root>/Version_<end>` into `<target>`:
//!
//! ```bash
//! cargo run --example format_versions -- music serialized 1 7
//! ```

use tracing_subscriber::EnvFilter;
use udown::{FormatRequest, formatter::format_versions_with_progress};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let root = args.first().map(String::as_str).unwrap_or("music");
    let target = args.get(1).map(String::as_str).unwrap_or("serialized");
    let start = args.get(2).map(|s| s.parse::<u32>()).transpose()?.unwrap_or(1);
    let end = args.get(3).map(|s| s.parse::<u32>()).transpose()?.unwrap_or(7);

    let request = FormatRequest::version_range(root, target, start, end);
    let report = format_versions_with_progress(&request, |p| {
        println!("[{}/{}] {}", p.position, p.total, p.label);
    })?;

    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for failure in &report.failed {
        println!("failed: {} ({})", failure.source.display(), failure.error);
    }
    println!(
        "{} written, {} skipped, {} failed",
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}
