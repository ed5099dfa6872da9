//! Scenario tests across store, index, selector and orchestrator.

pub(crate) mod support;

mod concurrency;
