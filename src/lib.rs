mod codec;
mod config;
mod constants;
mod control;
mod dump;
mod error;
mod hook;
mod mem_region;
mod message;
mod transfer;
mod utils;

pub use crate::codec::{decode, encode, read_ack, read_sequence};
pub use crate::config::ProxyConfig;
pub use crate::constants::*;
pub use crate::control::ControlNode;
pub use crate::dump::hex_dump;
pub use crate::error::Error;
pub use crate::hook::{
    install, is_installed, remove, set_verbose, transfer, transfer_status, verbose,
    TransferHandler,
};
pub use crate::mem_region::{MemRegion, SharedRegion};
pub use crate::message::{Message, MrqResetRequest, Payload};
pub use crate::transfer::{GuestProxy, ProxyModule};
