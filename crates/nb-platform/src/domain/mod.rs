//! Domain Models
//!
//! Users and their notes. Integer ids come from MySQL auto-increment columns.

pub mod note;
pub mod user;

pub use note::*;
pub use user::*;
