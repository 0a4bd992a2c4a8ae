pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod optimizer;
pub mod progress;
pub mod repo;
pub mod telemetry;
