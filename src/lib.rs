pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod jobs;
pub mod shutdown;
pub mod tls;
