pub mod connection;
mod connection_tx_storage;
mod room_registry;
pub mod server;
