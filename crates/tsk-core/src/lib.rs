//! Core of the `tsk` task tracker: the per-user config document and the
//! task storage contract.

pub mod backend;
pub mod config;
pub mod fsio;
pub mod keypath;
pub mod paths;
pub mod repository;
pub mod task;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
