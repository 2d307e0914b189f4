//! # Interface Layer
//!
//! The sections shipped with the bot.

pub mod sections;
