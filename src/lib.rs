//! Tank Arena Server Library
//!
//! Session backend for a real-time multiplayer tank game over UDP: a
//! fixed pool of tank resources, capacity-bounded sessions, and the
//! dispatcher that applies player commands and fans state out to each
//! session.

pub mod config;
pub mod util;
pub mod game;
pub mod session;
pub mod events;
pub mod net;
pub mod metrics;
