//! Two slot frame storage shared by the producer and the transfer-complete
//! interrupt.
//!
//! Slot life cycle: `WRITABLE -> PENDING (publish) -> ACTIVE (adopt) ->
//! WRITABLE (the other slot gets adopted)`.
//!
//! The state byte packs [`State`]. The DMA only ever reads the active slot;
//! the producer only ever writes the other one, and only while `pending` is
//! clear, so the interrupt can not adopt a half written frame.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use super::encoder::{EncodedFrame, TransferWord, FRAME_UNITS};
use super::status::Status;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub const fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    const fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

/// Live handoff state: which slot the engine streams, and whether the other
/// one holds a frame waiting for the next boundary.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct State {
    active: Slot,
    pending: bool,
}

impl State {
    const ACTIVE_B: u8 = 1 << 0;
    const PENDING: u8 = 1 << 1;

    const IDLE: State = State {
        active: Slot::A,
        pending: false,
    };

    const fn from_bits(bits: u8) -> Self {
        Self {
            active: if bits & Self::ACTIVE_B != 0 {
                Slot::B
            } else {
                Slot::A
            },
            pending: bits & Self::PENDING != 0,
        }
    }

    const fn bits(self) -> u8 {
        let active = match self.active {
            Slot::A => 0,
            Slot::B => Self::ACTIVE_B,
        };
        if self.pending {
            active | Self::PENDING
        } else {
            active
        }
    }

    /// Slot `publish` writes into
    const fn writable(self) -> Slot {
        self.active.other()
    }

    fn status_bits(self) -> u8 {
        let mut bits = 0;
        if self.active == Slot::B {
            bits |= Status::ACTIVE_B;
        }
        if self.pending {
            bits |= Status::PENDING;
        }
        bits
    }
}

/// Frame buffers and handoff flags. Lives in a `static`, DMA reads it directly.
///
/// ```ignore
/// static GALVO: Handoff<u32> = Handoff::new();
/// ```
pub struct Handoff<W> {
    slots: [UnsafeCell<[W; FRAME_UNITS]>; 2],
    state: AtomicU8,
    latched: AtomicU8,
    claimed: AtomicBool,
}

// SAFETY: one producer (enforced by `claim`) writes only the slot that is
// neither active nor pending; the interrupt never writes slots at all.
unsafe impl<W: Send> Sync for Handoff<W> {}

impl<W: TransferWord> Handoff<W> {
    pub const fn new() -> Self {
        Self {
            slots: [
                UnsafeCell::new([W::ZERO; FRAME_UNITS]),
                UnsafeCell::new([W::ZERO; FRAME_UNITS]),
            ],
            state: AtomicU8::new(State::IDLE.bits()),
            latched: AtomicU8::new(0),
            claimed: AtomicBool::new(false),
        }
    }

    /// Binds the storage to its only producer. `false` if already taken.
    pub(crate) fn claim(&self) -> bool {
        critical_section::with(|_| {
            let taken = self.claimed.load(Ordering::Relaxed);
            self.claimed.store(true, Ordering::Relaxed);
            !taken
        })
    }

    /// Zeroes both slots, slot A active, nothing pending.
    ///
    /// Only valid while the transfer engine is stopped.
    pub(crate) fn reset(&self) {
        critical_section::with(|_| {
            self.store(State::IDLE, Ordering::Relaxed);
            self.latched.store(0, Ordering::Relaxed);
        });
        for slot in &self.slots {
            // SAFETY: engine stopped, caller is the producer
            unsafe { (*slot.get()).fill(W::ZERO) };
        }
    }

    fn load(&self, order: Ordering) -> State {
        State::from_bits(self.state.load(order))
    }

    fn store(&self, state: State, order: Ordering) {
        self.state.store(state.bits(), order);
    }

    pub fn active(&self) -> Slot {
        self.load(Ordering::Acquire).active
    }

    pub fn is_pending(&self) -> bool {
        self.load(Ordering::Acquire).pending
    }

    /// DMA source address of `slot`.
    pub fn source(&self, slot: Slot) -> *const W {
        self.slots[slot.index()].get() as *const W
    }

    /// Producer side: fill the writable slot with `write`, then mark it pending.
    ///
    /// A frame still waiting for adoption is withdrawn first and
    /// `SUPERSEDED` is latched; its slot is then rewritten. The slot the DMA
    /// streams is never touched.
    pub(crate) fn publish(&self, write: impl FnOnce(&mut [W; FRAME_UNITS])) {
        let target = critical_section::with(|_| {
            let state = self.load(Ordering::Relaxed);
            if state.pending {
                self.store(
                    State {
                        pending: false,
                        ..state
                    },
                    Ordering::Relaxed,
                );
                self.latch(Status::SUPERSEDED);
            }
            state.writable()
        });

        // SAFETY: `target` is not active, and with `pending` clear the
        // interrupt can not make it active until the store below.
        write(unsafe { &mut *self.slots[target.index()].get() });

        critical_section::with(|_| {
            let state = self.load(Ordering::Relaxed);
            self.store(
                State {
                    pending: true,
                    ..state
                },
                Ordering::Release,
            );
        });
    }

    /// Consumer side: adopt the pending slot, if any.
    ///
    /// Called from the transfer-complete interrupt only. The producer can not
    /// preempt it, so no masking here.
    pub(crate) fn adopt(&self) -> Option<Slot> {
        let state = self.load(Ordering::Acquire);
        if !state.pending {
            return None;
        }

        let next = state.writable();
        self.store(
            State {
                active: next,
                pending: false,
            },
            Ordering::Release,
        );
        self.latch(Status::ADOPTED);
        Some(next)
    }

    /// Consistent view of the live and latched bits.
    pub(crate) fn status(&self) -> Status {
        critical_section::with(|_| self.snapshot())
    }

    pub(crate) fn take_status(&self) -> Status {
        critical_section::with(|_| {
            let status = self.snapshot();
            self.latched.store(0, Ordering::Relaxed);
            status
        })
    }

    /// Copy of a slot. Producer context only.
    pub(crate) fn frame(&self, slot: Slot) -> EncodedFrame<W> {
        // SAFETY: only the producer writes slots, and it is the caller
        EncodedFrame::from_units(unsafe { *self.slots[slot.index()].get() })
    }

    /// Caller holds the critical section.
    fn snapshot(&self) -> Status {
        Status::from_bits(
            self.load(Ordering::Acquire).status_bits() | self.latched.load(Ordering::Acquire),
        )
    }

    fn latch(&self, bits: u8) {
        let latched = self.latched.load(Ordering::Relaxed);
        self.latched.store(latched | bits, Ordering::Relaxed);
    }
}

impl<W: TransferWord> Default for Handoff<W> {
    fn default() -> Self {
        Self::new()
    }
}
