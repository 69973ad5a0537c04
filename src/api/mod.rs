// API module
//
// This module contains the HTTP interface of the node

pub mod handlers;
pub mod models;
pub mod routes;

// Re-export main components for easier access
pub use models::AppState;
pub use routes::configure_routes;
