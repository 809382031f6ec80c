pub mod api;
pub mod cli;
pub mod error;
pub mod metrics;
pub mod models;
pub mod server;
pub mod services;
pub mod state;
