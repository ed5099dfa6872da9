//! Index command handler.
//!
//! Maintenance operations on the vector index.

use clap::{Args, Subcommand};
use dashlens_context::ContextSystem;
use dashlens_core::AppResult;

/// Vector index maintenance
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Rebuild the index from the stored contexts
    Build {
        /// Rebuild even if the index is up to date
        #[arg(short, long)]
        force: bool,
    },

    /// Load the persisted index and report whether it is usable
    Load,

    /// Drop one dashboard from the index
    Remove {
        /// Dashboard id
        id: String,
    },
}

impl IndexCommand {
    pub async fn execute(&self, system: &ContextSystem) -> AppResult<()> {
        let manager = system.index_manager();

        match &self.action {
            IndexAction::Build { force } => {
                tracing::info!("Building index (force: {})", force);
                if manager.build(*force).await? {
                    println!(
                        "Index '{}' built with {} vectors",
                        manager.name(),
                        manager.vector_count().await
                    );
                } else {
                    println!("Index '{}' left unchanged", manager.name());
                }
            }
            IndexAction::Load => {
                tracing::info!("Loading persisted index");
                if manager.load_existing().await? {
                    println!(
                        "Loaded index '{}' with {} vectors",
                        manager.name(),
                        manager.vector_count().await
                    );
                } else {
                    println!("No usable index found for '{}'", manager.name());
                }
            }
            IndexAction::Remove { id } => {
                tracing::info!("Removing {} from index", id);
                if manager.remove(id).await? {
                    println!("Removed {} from index '{}'", id, manager.name());
                } else {
                    println!("{} was not in index '{}'", id, manager.name());
                }
            }
        }

        Ok(())
    }
}
