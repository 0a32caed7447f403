//! XY2-100 frame encoder.
//!
//! A frame carries one 20-bit field per channel, MSB first:
//!
//! ```text
//!  bit   19 18 17 16 ............ 1  0
//!  CHx    0  0  1  <---- data ----> P      P: even parity over bits 19..0
//!  SYNC   1  1  1  1 ............ 1  0
//!  CLK   _|‾|_|‾|_ ...
//! ```
//!
//! Every serial bit is two transfer units: CLK high, then CLK low. The unit
//! value is taken from one of two 4 entry lookup tables (SYNC high / SYNC
//! low) indexed by `ch1_bit | ch2_bit << 1`. The tables are built once from
//! a [`LineMap`], which says where on the port each line lives.

use core::iter;

use num::PrimInt;

use super::ConfigError;

/// Serial bits per frame
pub const FRAME_BITS: usize = 20;

/// Transfer units per serial bit, one per clock half-cycle
pub const UNITS_PER_BIT: usize = 2;

/// Transfer units per frame
pub const FRAME_UNITS: usize = FRAME_BITS * UNITS_PER_BIT;

const HEADER: u32 = 0b001 << 17;
const FIELD_MASK: u32 = 0x3_fffe;

/// Width of one DMA transfer unit.
pub trait TransferWord: PrimInt + Send + Sync + 'static {
    const ZERO: Self;

    fn width() -> usize {
        Self::ZERO.count_zeros() as usize
    }
}

impl TransferWord for u8 {
    const ZERO: Self = 0;
}

impl TransferWord for u16 {
    const ZERO: Self = 0;
}

impl TransferWord for u32 {
    const ZERO: Self = 0;
}

/// One (X, Y) galvo position.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub x: u16,
    pub y: u16,
}

impl Sample {
    pub const CENTER: Sample = Sample::new(0x8000, 0x8000);

    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// -32768 => 0, 0 => 32768, 32767 => 65535
    pub const fn from_signed(x: i16, y: i16) -> Self {
        Self {
            x: (x as i32 + 0x8000) as u16,
            y: (y as i32 + 0x8000) as u16,
        }
    }
}

pub fn parity(v: u32) -> u32 {
    v.count_ones() % 2
}

/// `[0 0 1 <data16> <parity>]` = 20 bit total
pub fn build_msg(data: u16) -> u32 {
    let res = (HEADER | (data as u32) << 1) & FIELD_MASK;
    res | parity(res)
}

/// Port bit carrying a line, and its inverted twin for differential drivers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Line {
    pub pin: u8,
    pub complement: Option<u8>,
}

impl Line {
    pub const fn single(pin: u8) -> Self {
        Self {
            pin,
            complement: None,
        }
    }

    pub const fn differential(pin: u8, complement: u8) -> Self {
        Self {
            pin,
            complement: Some(complement),
        }
    }

    const fn shifted(self, offset: u8) -> Self {
        Self {
            pin: self.pin.saturating_add(offset),
            complement: match self.complement {
                Some(pin) => Some(pin.saturating_add(offset)),
                None => None,
            },
        }
    }
}

/// How a transfer unit lands on the port.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteStyle {
    /// Output data register: unit bit = line level, other port bits get 0.
    Direct,
    /// Set/reset register: low half sets, high half resets, other bits untouched.
    SetReset,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineMap {
    pub clk: Line,
    pub sync: Line,
    pub x: Line,
    pub y: Line,
    pub style: WriteStyle,
}

impl LineMap {
    /// 8 line differential byte: CLK, SYNC, X, Y on bits 0..3, complements on bits 4..7.
    pub const DIFFERENTIAL_BYTE: LineMap = LineMap {
        clk: Line::differential(0, 4),
        sync: Line::differential(1, 5),
        x: Line::differential(2, 6),
        y: Line::differential(3, 7),
        style: WriteStyle::Direct,
    };

    pub const fn single_ended(clk: u8, sync: u8, x: u8, y: u8, style: WriteStyle) -> Self {
        Self {
            clk: Line::single(clk),
            sync: Line::single(sync),
            x: Line::single(x),
            y: Line::single(y),
            style,
        }
    }

    /// Same layout moved `offset` bits up the port. Pins past 255 stay at
    /// 255 and fail [`validate`](Self::validate).
    pub const fn shifted(self, offset: u8) -> Self {
        Self {
            clk: self.clk.shifted(offset),
            sync: self.sync.shifted(offset),
            x: self.x.shifted(offset),
            y: self.y.shifted(offset),
            style: self.style,
        }
    }

    fn lines(&self) -> [Line; 4] {
        [self.clk, self.sync, self.x, self.y]
    }

    fn pins(&self) -> impl Iterator<Item = u8> {
        self.lines()
            .into_iter()
            .flat_map(|l| iter::once(l.pin).chain(l.complement))
    }

    fn addressable<W: TransferWord>(&self) -> usize {
        match self.style {
            WriteStyle::Direct => W::width(),
            WriteStyle::SetReset => W::width() / 2,
        }
    }

    /// Every pin must fit the unit width, and no two lines may share a pin.
    pub fn validate<W: TransferWord>(&self) -> Result<(), ConfigError> {
        let limit = self.addressable::<W>();
        let mut used = 0u64;
        for pin in self.pins() {
            if pin as usize >= limit {
                return Err(ConfigError::LineOutOfRange(pin));
            }
            if used & (1 << pin) != 0 {
                return Err(ConfigError::LineConflict(pin));
            }
            used |= 1 << pin;
        }
        Ok(())
    }

    /// Transfer unit driving the lines to the given levels.
    pub fn drive<W: TransferWord>(&self, clk: bool, sync: bool, x: bool, y: bool) -> W {
        [(self.clk, clk), (self.sync, sync), (self.x, x), (self.y, y)]
            .into_iter()
            .fold(W::ZERO, |w, (line, level)| {
                let w = self.put(w, line.pin, level);
                match line.complement {
                    Some(pin) => self.put(w, pin, !level),
                    None => w,
                }
            })
    }

    fn put<W: TransferWord>(&self, w: W, pin: u8, level: bool) -> W {
        match (self.style, level) {
            (_, true) => w | W::one() << pin as usize,
            (WriteStyle::Direct, false) => w,
            (WriteStyle::SetReset, false) => w | W::one() << (pin as usize + W::width() / 2),
        }
    }

    /// Level `line` takes when `unit` is written, `None` if the unit leaves it alone.
    pub fn level<W: TransferWord>(&self, unit: W, line: Line) -> Option<bool> {
        let bit = |n: usize| unit & (W::one() << n) != W::ZERO;
        match self.style {
            WriteStyle::Direct => Some(bit(line.pin as usize)),
            WriteStyle::SetReset => {
                if bit(line.pin as usize) {
                    Some(true)
                } else if bit(line.pin as usize + W::width() / 2) {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }
}

/// A whole frame, in transmission order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EncodedFrame<W>([W; FRAME_UNITS]);

impl<W: TransferWord> EncodedFrame<W> {
    pub const fn blank() -> Self {
        Self([W::ZERO; FRAME_UNITS])
    }

    pub(crate) const fn from_units(units: [W; FRAME_UNITS]) -> Self {
        Self(units)
    }

    pub fn units(&self) -> &[W; FRAME_UNITS] {
        &self.0
    }

    /// Units of serial bit `bit`; bit 19 goes out first, bit 0 last.
    pub fn bit_cell(&self, bit: usize) -> [W; UNITS_PER_BIT] {
        let n = (FRAME_BITS - 1 - bit) * UNITS_PER_BIT;
        [self.0[n], self.0[n + 1]]
    }
}

impl<W> AsRef<[W]> for EncodedFrame<W> {
    fn as_ref(&self) -> &[W] {
        &self.0
    }
}

#[derive(Clone)]
pub struct Encoder<W> {
    sync_high: [[W; UNITS_PER_BIT]; 4],
    sync_low: [[W; UNITS_PER_BIT]; 4],
}

impl<W: TransferWord> Encoder<W> {
    pub fn new(lines: &LineMap) -> Result<Self, ConfigError> {
        lines.validate::<W>()?;

        let table = |sync: bool| -> [[W; UNITS_PER_BIT]; 4] {
            core::array::from_fn(|j| {
                let (x, y) = (j & 0b01 != 0, j & 0b10 != 0);
                [
                    lines.drive(true, sync, x, y),
                    lines.drive(false, sync, x, y),
                ]
            })
        };

        Ok(Self {
            sync_high: table(true),
            sync_low: table(false),
        })
    }

    /// Lookup table for bits 19..1 (`sync == true`) or for bit 0.
    pub fn table(&self, sync: bool) -> &[[W; UNITS_PER_BIT]; 4] {
        if sync {
            &self.sync_high
        } else {
            &self.sync_low
        }
    }

    pub fn encode(&self, x: u16, y: u16) -> EncodedFrame<W> {
        let mut units = [W::ZERO; FRAME_UNITS];
        self.encode_into(Sample::new(x, y), &mut units);
        EncodedFrame(units)
    }

    /// Encodes straight into a buffer slot.
    pub fn encode_into(&self, sample: Sample, out: &mut [W; FRAME_UNITS]) {
        let (ch1, ch2) = (build_msg(sample.x), build_msg(sample.y));

        for (n, cell) in out.chunks_exact_mut(UNITS_PER_BIT).enumerate() {
            let bit = FRAME_BITS - 1 - n;
            let j = ((ch1 >> bit) & 1 | ((ch2 >> bit) & 1) << 1) as usize;
            // sync == 0 only last bit
            cell.copy_from_slice(&self.table(bit != 0)[j]);
        }
    }
}
