pub mod types;
pub mod errors;
pub mod world;
pub mod game;
pub mod messages;
pub mod state;
pub mod westeros;
pub mod mustering;
pub mod consolidate;
pub mod action;
pub mod votes;
pub mod ingame;
pub mod session;
pub mod setup;


pub use errors::{BackendError, Rejection};
pub use messages::{ClientMessage, Outbound, ServerMessage};
pub use session::{Backend, Session};
pub use types::*;
