//! # Application Layer
//!
//! Routing, section lifecycle, sessions, input collection and background tasks.

pub mod access;
pub mod bot;
pub mod input;
pub mod lifecycle;
pub mod message;
pub mod resolver;
pub mod router;
pub mod section;
pub mod services;
pub mod session;
pub mod tasks;
