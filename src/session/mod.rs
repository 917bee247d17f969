//! Session management
//!
//! Sessions group players into shared arenas. The registry is the single
//! owner of session state and of the player -> session index; everything
//! else reaches sessions through it.

pub mod game_session;
pub mod registry;

pub use game_session::{GameSession, PlayerEntry, PlayerId, SessionError};
pub use registry::{RegistryError, SessionRegistry};
