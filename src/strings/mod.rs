//! # Strings
//!
//! Centralized user-facing text.

pub mod messages;
pub mod screens;
