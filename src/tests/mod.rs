//! tests/mod.rs
mod asset_dedup_tests;
mod batch_planner_tests;
mod common;
mod gateway_parsing_tests;
mod log_recovery_tests;
