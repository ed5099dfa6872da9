//! Command handlers for the DashLens CLI.

pub mod index;
pub mod refresh;
pub mod select;
pub mod status;

pub use index::IndexCommand;
pub use refresh::RefreshCommand;
pub use select::SelectCommand;
pub use status::StatusCommand;
