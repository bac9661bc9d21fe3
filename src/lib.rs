//! Streaming chat relay for a page-assistant widget.
//!
//! A relay coordinator forwards chat turns to a streaming completion backend
//! and pushes chunks back to per-connection conversation views; completed
//! turns are persisted to an append-only history store browsable per page.

pub mod agent;
pub mod db;
pub mod errors;
pub mod models;
pub mod relay;
pub mod routes;
pub mod session;
pub mod state;
