pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod observability;
pub mod services;
pub mod store;
