//! Network layer: protocol boundary, command dispatch, transports

pub mod auth;
pub mod consumer;
pub mod dispatcher;
pub mod protocol;
pub mod udp;

pub use dispatcher::{Dispatcher, Outcome};
pub use udp::UdpServer;
