//! # Rollcall Common Library
//!
//! Shared code for the rollcall attendance engine:
//! - Error taxonomy
//! - Configuration loading and root folder resolution
//! - Database pool initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
