//! # BrickVault Common Library
//!
//! Shared code for the BrickVault services:
//! - Error type used by the stores and services
//! - Configuration loading and root folder resolution
//! - Event bus and notification sink
//! - Table creation for the shared database

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
