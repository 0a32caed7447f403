//! XY2-100 galvanometer waveform generator.
//!
//! A periodic DMA transfer streams a pre-encoded serial frame (CLK, SYNC,
//! X and Y data with parity) to a GPIO port without CPU involvement. The
//! application publishes new positions into the idle half of a two slot
//! buffer; the transfer-complete interrupt swaps slots on the next frame
//! boundary.
//!
//! ```text
//!  set_pos(x, y) ──encode──► [slot B]      DMA ──► GPIO port
//!                   publish ──┐              ▲
//!                             ▼              │ rearm(slot)
//!                       Handoff{active, pending}
//!                             ▲              │
//!                             └── on_transfer_complete() (DMA TC irq)
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod support;

pub mod command;
pub mod config;
pub mod control;
pub mod pattern;

pub use control::xy2_100::{
    encoder::{EncodedFrame, Encoder, LineMap, Sample, TransferWord},
    handoff::{Handoff, Slot},
    status::Status,
    CompletionCoordinator, Config, ConfigError, TransferEngine, Transmitter, XY2_100,
};
