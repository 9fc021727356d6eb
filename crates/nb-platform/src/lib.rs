//! Notebase Platform
//!
//! Note-taking backend providing:
//! - Stateless access/refresh session tokens and a request Auth Gate
//! - Per-request transaction binding with savepoints
//! - A save pipeline with before/after-persist hook queues
//! - Users and owner-only notes on MySQL, with a Redis list cache

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod repository;
pub mod service;

pub use config::PlatformConfig;
pub use domain::*;
pub use error::{PlatformError, Result};
