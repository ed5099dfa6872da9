//! Refresh command handler.
//!
//! Reads the dashboard listing from a file and regenerates whatever has expired.

use clap::Args;
use dashlens_context::{ContextSystem, RefreshReport, StaticSource};
use dashlens_core::AppResult;
use std::path::PathBuf;
use std::sync::Arc;

/// Regenerate expired dashboard contexts
#[derive(Args, Debug)]
pub struct RefreshCommand {
    /// Dashboard listing (JSON or YAML)
    #[arg(short, long)]
    pub dashboards: PathBuf,

    /// Regenerate every listed dashboard regardless of age
    #[arg(short, long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RefreshCommand {
    pub async fn execute(&self, system: ContextSystem) -> AppResult<()> {
        tracing::info!("Executing refresh command");
        tracing::debug!("Refresh options: {:?}", self);

        let system = system.with_source(Arc::new(StaticSource::new(&self.dashboards)));
        let report = system.refresh_from_source(self.force).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        Ok(())
    }
}

fn print_report(report: &RefreshReport) {
    println!("Dashboards listed: {}", report.total_dashboards);
    println!("Expired:           {}", report.expired_count);
    println!("Removed:           {}", report.removed_count);
    println!("Updated:           {}", report.updated.len());

    for updated in &report.updated {
        println!("  + {} ({}) at {}", updated.name, updated.id, updated.update_time);
    }

    if !report.failed.is_empty() {
        println!("Failed:            {}", report.failed.len());
        for failed in &report.failed {
            println!("  ! {}: {}", failed.id, failed.error);
        }
    }

    if report.index_rebuilt {
        println!("Vector index rebuilt");
    }
}
