//! HTTP API.
//!
//! A thin JSON projection of the engine contracts: submit, poll, table
//! reads, listing, search, stats and health. Routes are nested under `/api/`.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
