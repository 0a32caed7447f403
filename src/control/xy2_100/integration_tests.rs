//! Software loopback of the whole handoff.
//!
//! ```text
//! Transmitter.set_pos() → Handoff slot → SimEngine "DMA" → wire frames
//!                                  ▲              │
//!                                  └── CompletionCoordinator.on_transfer_complete()
//! ```
//!
//! `SimEngine` reads the armed source buffer when a cycle is run, the way
//! the DMA streams it, then the test fires the completion handler.

use super::encoder::{build_msg, LineMap, Sample, FRAME_BITS, FRAME_UNITS};
use super::handoff::{Handoff, Slot};
use super::{CompletionCoordinator, Config, TransferEngine, Transmitter, XY2_100};

#[derive(Default)]
struct SimEngine {
    source: Option<*const u8>,
    units: usize,
    one_shot: bool,
    listening: bool,
    armed: bool,
    rate: u32,
}

impl TransferEngine for SimEngine {
    type Word = u8;

    fn set_destination_port(&mut self, _address: u32) {}

    fn set_trigger_rate(&mut self, rate_hz: u32) {
        self.rate = rate_hz;
    }

    fn configure(&mut self, source: *const u8, units: usize) {
        self.source = Some(source);
        self.units = units;
    }

    fn disable_after_one_cycle(&mut self) {
        self.one_shot = true;
    }

    fn enable_completion_interrupt(&mut self) {
        self.listening = true;
    }

    fn clear_completion(&mut self) {
        assert!(!self.armed, "completion acknowledged mid-cycle");
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn rearm(&mut self, source: *const u8) {
        self.source = Some(source);
        self.arm();
    }
}

impl SimEngine {
    /// Streams one cycle, returns what went out on the port.
    fn transmit(&mut self) -> Vec<u8> {
        assert!(self.armed && self.one_shot && self.listening);
        let source = self.source.expect("engine not configured");
        // SAFETY: points into a leaked `Handoff`, nothing writes during the read
        let units = unsafe { core::slice::from_raw_parts(source, self.units) }.to_vec();
        self.armed = false;
        units
    }
}

type Irq = CompletionCoordinator<SimEngine>;

fn start() -> (Transmitter<u8>, Irq) {
    let handoff: &'static Handoff<u8> = Box::leak(Box::new(Handoff::new()));
    XY2_100::new(handoff, SimEngine::default(), Config::default())
        .unwrap()
        .begin()
}

/// One DMA cycle followed by its completion interrupt.
fn cycle(irq: &mut Irq) -> Vec<u8> {
    let wire = irq.engine_mut().transmit();
    irq.on_transfer_complete();
    wire
}

/// Decodes a wire frame, checking framing and parity.
fn receive(wire: &[u8]) -> Option<Sample> {
    let lines = LineMap::DIFFERENTIAL_BYTE;
    assert_eq!(wire.len(), FRAME_UNITS);

    let (mut ch1, mut ch2) = (0u32, 0u32);
    for (n, cell) in wire.chunks_exact(2).enumerate() {
        let bit = FRAME_BITS - 1 - n;
        let sync = lines.level(cell[0], lines.sync) == Some(true);
        if sync != (bit != 0) {
            return None;
        }
        ch1 |= ((lines.level(cell[0], lines.x) == Some(true)) as u32) << bit;
        ch2 |= ((lines.level(cell[0], lines.y) == Some(true)) as u32) << bit;
    }

    let field = |ch: u32| (ch.count_ones() % 2 == 0 && ch >> 17 == 1).then(|| (ch >> 1) as u16);
    Some(Sample::new(field(ch1)?, field(ch2)?))
}

#[test]
fn idle_output_is_blank_and_repeats() {
    let (tx, mut irq) = start();

    for _ in 0..3 {
        assert_eq!(cycle(&mut irq), vec![0u8; FRAME_UNITS]);
        assert_eq!(tx.status().active(), Slot::A);
    }
    assert_eq!(irq.frames(), 3);
    assert_eq!(irq.engine().rate, crate::config::GALVO_TRANSFER_RATE);
}

#[test]
fn published_frame_goes_out_after_the_boundary() {
    let (mut tx, mut irq) = start();
    let expected = tx.encoder().encode(0x1234, 0xfedc);

    // frame in flight keeps going out while the new one is published
    tx.set_pos(0x1234, 0xfedc);
    assert!(tx.is_pending());
    assert_eq!(cycle(&mut irq), vec![0u8; FRAME_UNITS]);

    // adopted at that boundary
    assert!(!tx.is_pending());
    assert_eq!(tx.status().active(), Slot::B);
    assert_eq!(tx.frame(Slot::B), expected);

    let wire = cycle(&mut irq);
    assert_eq!(wire, expected.units());
    assert_eq!(receive(&wire), Some(Sample::new(0x1234, 0xfedc)));
}

#[test]
fn idle_completion_repeats_last_frame() {
    let (mut tx, mut irq) = start();
    tx.set_pos(7, 9);
    cycle(&mut irq);

    let first = cycle(&mut irq);
    for _ in 0..5 {
        assert_eq!(cycle(&mut irq), first);
    }
    assert_eq!(tx.status().active(), Slot::B);
    assert_eq!(receive(&first), Some(Sample::new(7, 9)));
}

#[test]
fn signed_and_unsigned_encode_the_same() {
    let (mut tx, mut irq) = start();
    tx.set_signed_pos(-32768, 32767);
    cycle(&mut irq);
    let signed = cycle(&mut irq);

    tx.set_pos(0, 65535);
    cycle(&mut irq);
    let unsigned = cycle(&mut irq);

    assert_eq!(signed, unsigned);
    assert_eq!(receive(&signed), Some(Sample::new(0, 0xffff)));
    assert_eq!(tx.last_pos(), Sample::new(0, 0xffff));
}

#[test]
fn boundary_fields_on_the_wire() {
    let (mut tx, mut irq) = start();

    for (v, field) in [(0u16, 0x20001u32), (0xffff, 0x3ffff)] {
        tx.set_pos(v, v);
        cycle(&mut irq);
        let wire = cycle(&mut irq);
        assert_eq!(build_msg(v), field);
        assert_eq!(receive(&wire), Some(Sample::new(v, v)));
    }
}

#[test]
fn two_publishes_in_one_cycle_send_the_latest_whole() {
    let (mut tx, mut irq) = start();
    tx.read_and_clear_status();

    tx.set_pos(0x1111, 0x2222);
    tx.set_pos(0x3333, 0x4444);
    assert_eq!(cycle(&mut irq), vec![0u8; FRAME_UNITS]);
    assert_eq!(receive(&cycle(&mut irq)), Some(Sample::new(0x3333, 0x4444)));

    let status = tx.read_and_clear_status();
    assert!(status.was_superseded());
    assert!(status.was_adopted());
    assert!(!status.is_pending());

    let status = tx.read_and_clear_status();
    assert!(!status.was_superseded() && !status.was_adopted());
}

#[test]
fn every_frame_on_the_wire_is_whole() {
    let (mut tx, mut irq) = start();
    let mut seed = 0x2545_f491u32;
    let mut published = vec![];
    let mut last_adopted = None;

    for _ in 0..2000 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;

        if seed & 3 != 0 {
            let sample = Sample::new(seed as u16, (seed >> 16) as u16);
            tx.set_sample(sample);
            published.push(sample);
        } else {
            let pending = tx.is_pending();
            let wire = cycle(&mut irq);
            if wire.iter().any(|u| *u != 0) {
                let got = receive(&wire).expect("torn frame on the wire");
                assert!(published.contains(&got));
                assert_eq!(Some(got), last_adopted);
            }
            if pending {
                last_adopted = Some(tx.last_pos());
            }
        }
    }
}
