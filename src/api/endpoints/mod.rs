//! API endpoint handlers. Each delegates to `EngineState`.

pub mod documents;
pub mod health;
pub mod search;
pub mod tables;
pub mod tasks;
