//! Status command handler.

use clap::Args;
use dashlens_context::ContextSystem;
use dashlens_core::AppResult;

/// Show cache and index status
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, system: &ContextSystem) -> AppResult<()> {
        tracing::info!("Executing status command");

        let status = system.status().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        println!("Contexts");
        println!("  total:    {}", status.total_contexts);
        println!("  fresh:    {}", status.fresh_contexts);
        println!("  expired:  {}", status.expired_contexts);
        println!("  ttl days: {}", status.ttl_days);
        println!("  dir:      {}", status.context_dir.display());

        let index = &status.index;
        println!("Index '{}'", index.index_name);
        println!("  loaded:   {}", index.loaded);
        println!("  vectors:  {}", index.stats.vector_count);
        println!(
            "  model:    {}/{} ({} dims)",
            index.stats.provider, index.stats.model, index.stats.dimension
        );
        println!(
            "  built:    {}",
            index.last_build_time.as_deref().unwrap_or("never")
        );
        println!("  stale:    {}", index.should_rebuild);

        println!("Selection");
        println!("  active:   {}", status.active_method);
        if let Some(last) = status.last_method {
            println!("  last:     {}", last);
        }

        Ok(())
    }
}
