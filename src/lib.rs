//! # sectionkit
//!
//! Section-based routing for chat bots: commands, keyword replies and inline buttons are
//! mapped onto methods of section objects, with per-user sessions, validated input
//! collection and supervised background tasks.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod strings;
