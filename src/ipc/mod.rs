//! IPC module for event-source and settings-UI communication

mod protocol;
mod server;

pub use server::Server;
