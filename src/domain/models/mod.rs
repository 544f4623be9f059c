mod action;
mod error;
mod event;
mod message;
mod protocol;
mod provider;
mod relay;
mod session_state;
mod slash_commands;
mod store;
mod transport;

pub use action::*;
pub use error::*;
pub use event::*;
pub use message::*;
pub use protocol::*;
pub use provider::*;
pub use relay::*;
pub use session_state::*;
pub use slash_commands::*;
pub use store::*;
pub use transport::*;
