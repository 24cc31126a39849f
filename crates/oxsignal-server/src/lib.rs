pub mod config;
pub mod report;
pub mod rule_seed;
pub mod state;
