use core::fmt;

pub mod encoder;
pub mod engine;
pub mod handoff;
pub mod status;

#[cfg(feature = "stm32f103")]
pub mod tim2_gpiob_3456;

#[cfg(test)]
mod integration_tests;

pub use engine::TransferEngine;

use encoder::{EncodedFrame, Encoder, LineMap, Sample, FRAME_UNITS};
use handoff::{Handoff, Slot};
use status::Status;

// 1. A timer triggers a DMA channel that copies units from memory to the GPIO port
// 2. One frame = 40 units -> 20 CLKs
// 3. The DMA stops after one frame and raises transfer complete
// 4. The interrupt adopts the other buffer if a new frame is ready, then restarts
// 5. New positions are always encoded into the buffer the DMA does not read

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// pin does not fit the transfer unit
    LineOutOfRange(u8),
    /// pin used by two lines
    LineConflict(u8),
    ZeroTriggerRate,
    /// the handoff storage already has a producer
    HandoffInUse,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LineOutOfRange(pin) => {
                write!(f, "line on bit {} outside transfer unit", pin)
            }
            ConfigError::LineConflict(pin) => write!(f, "bit {} drives two lines", pin),
            ConfigError::ZeroTriggerRate => f.write_str("trigger rate is 0 Hz"),
            ConfigError::HandoffInUse => f.write_str("handoff storage already bound"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub lines: LineMap,
    /// transfer units per second
    pub transfer_rate: u32,
    /// port register address
    pub destination: u32,
}

impl Config {
    pub const fn new(destination: u32, lines: LineMap) -> Self {
        Self {
            lines,
            transfer_rate: crate::config::GALVO_TRANSFER_RATE,
            destination,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(0, LineMap::DIFFERENTIAL_BYTE)
    }
}

/// Galvo output before bring-up. [`begin`](Self::begin) splits it into the
/// mainline [`Transmitter`] and the interrupt-side [`CompletionCoordinator`].
#[allow(non_camel_case_types)]
pub struct XY2_100<E: TransferEngine> {
    handoff: &'static Handoff<E::Word>,
    engine: E,
    encoder: Encoder<E::Word>,
    config: Config,
}

impl<E: TransferEngine> XY2_100<E> {
    pub fn new(
        handoff: &'static Handoff<E::Word>,
        engine: E,
        config: Config,
    ) -> Result<Self, ConfigError> {
        if config.transfer_rate == 0 {
            return Err(ConfigError::ZeroTriggerRate);
        }
        let encoder = Encoder::new(&config.lines)?;
        if !handoff.claim() {
            warn!("XY2-100: handoff storage already bound");
            return Err(ConfigError::HandoffInUse);
        }

        Ok(Self {
            handoff,
            engine,
            encoder,
            config,
        })
    }

    /// Zeroes both slots and starts streaming slot A.
    pub fn begin(mut self) -> (Transmitter<E::Word>, CompletionCoordinator<E>) {
        self.handoff.reset();

        let engine = &mut self.engine;
        engine.set_destination_port(self.config.destination);
        engine.set_trigger_rate(self.config.transfer_rate);
        engine.configure(self.handoff.source(Slot::A), FRAME_UNITS);
        engine.disable_after_one_cycle();
        engine.enable_completion_interrupt();
        engine.arm();

        info!(
            "XY2-100 started: {} units/s, {} frames/s",
            self.config.transfer_rate,
            self.config.transfer_rate / FRAME_UNITS as u32
        );

        (
            Transmitter {
                handoff: self.handoff,
                encoder: self.encoder,
                last: Sample::default(),
            },
            CompletionCoordinator {
                handoff: self.handoff,
                engine: self.engine,
                frames: 0,
            },
        )
    }
}

/// Mainline half: encodes and publishes positions.
///
/// Publish at most once per frame period (`FRAME_UNITS / transfer_rate`).
/// A second publish before the frame boundary replaces the first one, which
/// then never reaches the wire; the status `SUPERSEDED` bit reports it.
pub struct Transmitter<W: 'static> {
    handoff: &'static Handoff<W>,
    encoder: Encoder<W>,
    last: Sample,
}

impl<W: encoder::TransferWord> Transmitter<W> {
    pub fn set_pos(&mut self, x: u16, y: u16) {
        self.set_sample(Sample::new(x, y));
    }

    /// -32768..32767 mapped onto 0..65535
    pub fn set_signed_pos(&mut self, x: i16, y: i16) {
        self.set_sample(Sample::from_signed(x, y));
    }

    pub fn set_sample(&mut self, sample: Sample) {
        let encoder = &self.encoder;
        self.handoff.publish(|slot| encoder.encode_into(sample, slot));
        self.last = sample;
    }

    pub fn last_pos(&self) -> Sample {
        self.last
    }

    /// `true` while the last published frame has not gone out yet.
    pub fn is_pending(&self) -> bool {
        self.handoff.is_pending()
    }

    /// Current flags without clearing anything.
    pub fn status(&self) -> Status {
        self.handoff.status()
    }

    pub fn read_and_clear_status(&mut self) -> Status {
        self.handoff.take_status()
    }

    pub fn frame(&self, slot: Slot) -> EncodedFrame<W> {
        self.handoff.frame(slot)
    }

    pub fn encoder(&self) -> &Encoder<W> {
        &self.encoder
    }
}

/// Interrupt half: runs from the DMA transfer complete interrupt.
pub struct CompletionCoordinator<E: TransferEngine> {
    handoff: &'static Handoff<E::Word>,
    engine: E,
    frames: u32,
}

impl<E: TransferEngine> CompletionCoordinator<E> {
    /// One call per finished frame. Adopts a pending frame, or repeats the
    /// current one, and restarts the engine.
    pub fn on_transfer_complete(&mut self) {
        self.engine.clear_completion();

        let slot = self
            .handoff
            .adopt()
            .unwrap_or_else(|| self.handoff.active());
        self.engine.rearm(self.handoff.source(slot));

        self.frames = self.frames.wrapping_add(1);
    }

    /// Frames sent since `begin`, wrapping.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Destination(u32),
        Rate(u32),
        Configure(*const u8, usize),
        OneShot,
        Listen,
        Clear,
        Arm,
        Rearm(*const u8),
    }

    #[derive(Default)]
    struct Recorder(Vec<Call>);

    impl TransferEngine for Recorder {
        type Word = u8;

        fn set_destination_port(&mut self, address: u32) {
            self.0.push(Call::Destination(address));
        }
        fn set_trigger_rate(&mut self, rate_hz: u32) {
            self.0.push(Call::Rate(rate_hz));
        }
        fn configure(&mut self, source: *const u8, units: usize) {
            self.0.push(Call::Configure(source, units));
        }
        fn disable_after_one_cycle(&mut self) {
            self.0.push(Call::OneShot);
        }
        fn enable_completion_interrupt(&mut self) {
            self.0.push(Call::Listen);
        }
        fn clear_completion(&mut self) {
            self.0.push(Call::Clear);
        }
        fn arm(&mut self) {
            self.0.push(Call::Arm);
        }
        fn rearm(&mut self, source: *const u8) {
            self.0.push(Call::Rearm(source));
        }
    }

    fn handoff() -> &'static Handoff<u8> {
        Box::leak(Box::new(Handoff::new()))
    }

    #[test]
    fn begin_arms_slot_a() {
        let h = handoff();
        let config = Config::new(0x4000_0000, LineMap::DIFFERENTIAL_BYTE);
        let galvo = XY2_100::new(h, Recorder::default(), config).unwrap();
        let (_tx, irq) = galvo.begin();

        assert_eq!(
            irq.engine().0,
            [
                Call::Destination(0x4000_0000),
                Call::Rate(crate::config::GALVO_TRANSFER_RATE),
                Call::Configure(h.source(Slot::A), FRAME_UNITS),
                Call::OneShot,
                Call::Listen,
                Call::Arm,
            ]
        );
    }

    #[test]
    fn completion_acknowledges_before_rearm() {
        let h = handoff();
        let (mut tx, mut irq) = XY2_100::new(h, Recorder::default(), Config::default())
            .unwrap()
            .begin();

        irq.on_transfer_complete();
        tx.set_pos(1, 2);
        irq.on_transfer_complete();

        assert_eq!(
            irq.engine().0[6..],
            [
                Call::Clear,
                Call::Rearm(h.source(Slot::A)),
                Call::Clear,
                Call::Rearm(h.source(Slot::B)),
            ]
        );
        assert_eq!(irq.frames(), 2);
    }

    #[test]
    fn rejects_bad_config() {
        let mut config = Config::default();
        config.transfer_rate = 0;
        assert_eq!(
            XY2_100::new(handoff(), Recorder::default(), config).err(),
            Some(ConfigError::ZeroTriggerRate)
        );

        let config = Config::new(0, LineMap::DIFFERENTIAL_BYTE.shifted(4));
        assert_eq!(
            XY2_100::new(handoff(), Recorder::default(), config).err(),
            Some(ConfigError::LineOutOfRange(8))
        );
    }

    #[test]
    fn one_producer_per_handoff() {
        let h = handoff();
        let _first = XY2_100::new(h, Recorder::default(), Config::default()).unwrap();
        assert_eq!(
            XY2_100::new(h, Recorder::default(), Config::default()).err(),
            Some(ConfigError::HandoffInUse)
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ConfigError::LineConflict(3).to_string(),
            "bit 3 drives two lines"
        );
        assert_eq!(
            ConfigError::ZeroTriggerRate.to_string(),
            "trigger rate is 0 Hz"
        );
    }
}
