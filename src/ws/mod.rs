pub mod connection;
pub mod handler;
pub mod hub;
pub mod session;
pub mod sweeper;
