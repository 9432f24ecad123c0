//! Socket.IO 1.x Common Types and Protocol
//!
//! Frame model, text codec and handshake parsing shared by the client and
//! the echo server.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod types;

pub use error::*;
pub use frame::{decode, encode};
pub use handshake::*;
pub use types::*;
