mod client_session;
pub mod draw_command;
mod history;
mod message;
mod snapshot;
mod surface;

pub use client_session::*;
pub use draw_command::*;
pub use history::*;
pub use message::*;
pub use snapshot::*;
pub use surface::*;

pub extern crate bincode;
pub extern crate euclid;
pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;
