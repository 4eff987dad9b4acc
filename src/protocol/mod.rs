//! Wire vocabulary and reply interpretation for the instrument's SCPI dialect.
//!
//! - [`commands`]: the literal command table and [`Command`] builder
//! - [`reply`]: [`Reply`] text plus the literal patterns read from it
//! - [`classifier`]: detection of instrument-reported errors
//!
//! Nothing here touches the network; see [`crate::session`] for that.

pub mod classifier;
pub mod commands;
pub mod reply;

pub use classifier::{classify, InstrumentFault, ERROR_CATALOGUE};
pub use commands::{Command, Scpi};
pub use reply::{LinkState, Reply, ToggleState};

/// The instrument's success literal, ending a reply that carries the status line.
pub const ERROR_FREE: &[u8] = b"No error";

/// Never sent by the instrument; reads using it end by timing out.
pub const SILENCE: &[u8] = b"***$$$---@@@+++";

/// Never sent by the instrument; used for the bootstrap port queries.
pub const PORT_SENTINEL: &[u8] = b"****$$$$";
