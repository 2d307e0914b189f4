//! # Domain Layer
//!
//! Core definitions, types, and traits that define the dispatch domain.
//! Independent of any chat platform, serving as the contract for the other layers.

pub mod config;
pub mod errors;
pub mod keyboard;
pub mod route;
pub mod traits;
pub mod types;
