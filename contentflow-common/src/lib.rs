//! # ContentFlow Common Library
//!
//! Shared code for the ContentFlow services:
//! - Error type used below the HTTP layer
//! - Settings loading (TOML file + environment)
//! - Database pool initialization
//! - Notification message types pushed to live sessions

pub mod config;
pub mod db;
pub mod error;
pub mod notifications;

pub use error::{Error, Result};
pub use notifications::{MessageKind, NotificationMessage};
