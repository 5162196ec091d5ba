pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod forms;
pub mod listing;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod policy;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage; // media files behind a backend trait

// Re-export commonly used items for tests / external users
pub use routes::{config, not_found, AppState};
pub use security::SecurityHeaders;
