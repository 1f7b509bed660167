//! Bandforge API Library Crate
//!
//! This library contains all the core logic for the Bandforge web service,
//! including the application state, API handlers, speech services, and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod speech;
pub mod state;
