//! Type definitions for Coach Server
//!
//! This module contains all the data types used throughout the application,
//! including database row types and API response types.

pub mod message;
pub mod usage;

pub use message::*;
pub use usage::*;
