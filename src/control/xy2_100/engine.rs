use super::encoder::TransferWord;

/// Timer-paced, one-shot memory -> port transfer (DMA channel + trigger timer).
///
/// Once armed it must write exactly the configured number of units from the
/// source to the destination port at the trigger rate, with no gaps, then
/// stop and raise its completion interrupt once. Everything past that is
/// done by [`CompletionCoordinator`](super::CompletionCoordinator).
pub trait TransferEngine {
    /// Transfer unit, one GPIO write
    type Word: TransferWord;

    /// Peripheral register every unit is written to.
    fn set_destination_port(&mut self, address: u32);

    /// Units per second.
    fn set_trigger_rate(&mut self, rate_hz: u32);

    /// Source buffer and units per cycle.
    fn configure(&mut self, source: *const Self::Word, units: usize);

    /// Stop after `units` transfers instead of wrapping around.
    fn disable_after_one_cycle(&mut self);

    /// Raise the completion interrupt at the end of each cycle.
    fn enable_completion_interrupt(&mut self);

    /// Acknowledge the completion interrupt and halt the trigger.
    fn clear_completion(&mut self);

    /// Start the first cycle.
    fn arm(&mut self);

    /// Start another cycle from `source`.
    fn rearm(&mut self, source: *const Self::Word);
}

/// Reload value for a timer dividing `timer_clk` down to about `rate_hz`.
///
/// Returns `(reload, effective rate)`. The divider is clamped to
/// `1..=max_divider`, so a rate above the timer clock runs at the timer clock
/// and a rate of 0 at the slowest the counter allows.
pub fn timer_reload(timer_clk: u32, rate_hz: u32, max_divider: u32) -> (u32, u32) {
    let divider = timer_clk
        .checked_div(rate_hz)
        .unwrap_or(max_divider)
        .clamp(1, max_divider.max(1));
    (divider - 1, timer_clk / divider)
}
