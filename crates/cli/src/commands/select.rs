//! Select command handler.

use clap::Args;
use dashlens_context::{ContextSystem, DEFAULT_TOP_K};
use dashlens_core::AppResult;

/// Pick the dashboards most relevant to a question
#[derive(Args, Debug)]
pub struct SelectCommand {
    /// The question to answer
    pub question: String,

    /// Number of dashboards to return
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SelectCommand {
    pub async fn execute(&self, system: &ContextSystem) -> AppResult<()> {
        tracing::info!("Executing select command");
        tracing::debug!("Select options: {:?}", self);

        let selection = system.select(&self.question, self.top_k).await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&selection)?);
            return Ok(());
        }

        let Some(method) = selection.method else {
            println!("No dashboard contexts available. Run `dashlens refresh` first.");
            return Ok(());
        };

        println!("Method: {}", method);
        for (rank, scored) in selection.results.iter().enumerate() {
            println!(
                "{}. {} (id: {}) score {:.3}",
                rank + 1,
                scored.context.dashboard_name,
                scored.context.dashboard_id,
                scored.score
            );
        }

        Ok(())
    }
}
