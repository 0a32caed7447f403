use super::handoff::Slot;

/// Snapshot of the handoff flags.
///
/// `ACTIVE_B` and `PENDING` mirror the live state. `ADOPTED` and
/// `SUPERSEDED` are one-shot: they stay set until read with
/// [`Transmitter::read_and_clear_status`](super::Transmitter::read_and_clear_status).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(u8);

impl Status {
    /// DMA streams slot B
    pub const ACTIVE_B: u8 = 1 << 0;
    /// a published frame waits for the next frame boundary
    pub const PENDING: u8 = 1 << 1;
    /// a frame was adopted since the last read
    pub const ADOPTED: u8 = 1 << 2;
    /// a publish replaced a frame that never went out
    pub const SUPERSEDED: u8 = 1 << 7;

    pub const LIVE: u8 = Self::ACTIVE_B | Self::PENDING;
    pub const LATCHED: u8 = Self::ADOPTED | Self::SUPERSEDED;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn active(self) -> Slot {
        if self.0 & Self::ACTIVE_B != 0 {
            Slot::B
        } else {
            Slot::A
        }
    }

    pub fn is_pending(self) -> bool {
        self.0 & Self::PENDING != 0
    }

    pub fn was_adopted(self) -> bool {
        self.0 & Self::ADOPTED != 0
    }

    pub fn was_superseded(self) -> bool {
        self.0 & Self::SUPERSEDED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bits() {
        let s = Status::from_bits(Status::ACTIVE_B | Status::SUPERSEDED);
        assert_eq!(s.active(), Slot::B);
        assert!(!s.is_pending());
        assert!(!s.was_adopted());
        assert!(s.was_superseded());

        assert_eq!(Status::default().active(), Slot::A);
        assert_eq!(Status::LIVE & Status::LATCHED, 0);
    }
}
