//! Test helpers module
//!
//! This module provides utilities and helpers for testing the RosterDesk application.
//! It includes the in-memory test context, collaborator doubles, test data
//! builders, captured log output and the Postgres test database.

#![allow(dead_code)]

pub mod database_helper;
pub mod doubles;
pub mod log_capture;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use doubles::*;
pub use log_capture::*;
pub use test_context::*;
pub use test_data::*;
