// Library root. Exposes the modules to the binary and to integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod alerts;
pub mod api;
pub mod backoff;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod services;
