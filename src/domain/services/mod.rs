pub mod actions;
mod context;
mod conversation;
mod credentials;
mod frames;
mod generation;
mod persistence;
pub mod relay;
mod throttle;

pub use context::*;
pub use conversation::*;
pub use credentials::*;
pub use frames::*;
pub use generation::*;
pub use persistence::*;
pub use throttle::*;
