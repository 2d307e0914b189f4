//! # Infrastructure Layer
//!
//! Handles interactions with external systems.
//! Implements the traits defined in the Domain layer (`ChatProvider`, `UserStore`).

pub mod console;
pub mod logging;
pub mod memory_store;
pub mod recording;
