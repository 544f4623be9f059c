pub mod providers;
pub mod store;
pub mod transport;
