//! Compile-time settings.

/// DMA transfer unit rate, Hz. Two units per serial clock: 2 MHz XY2-100 clock.
pub const GALVO_TRANSFER_RATE: u32 = 4_000_000;

/// Frames per second at [`GALVO_TRANSFER_RATE`]
pub const GALVO_FRAME_RATE: u32 =
    GALVO_TRANSFER_RATE / crate::control::xy2_100::encoder::FRAME_UNITS as u32;

//-----------------------------------------------------------------------------

/// test pattern step period
pub const PATTERN_STEP_MS: u32 = 1;

/// points per full circle of the test pattern
pub const PATTERN_CIRCLE_POINTS: u32 = 360;

/// test pattern radius, galvo units
pub const PATTERN_RADIUS: u16 = 16384;

//-----------------------------------------------------------------------------

/// longest accepted command line
pub const COMMAND_LINE_LEN: usize = 64;

pub const USB_VID: u16 = 0x16c0;
pub const USB_PID: u16 = 0x27dd;

pub const USB_MANUFACTURER: &str = "OPAL";
pub const USB_PRODUCT: &str = "XY2-100 galvo driver";
pub const USB_SERIAL: &str = "0001";
