//! STM32F103: TIM2 update event -> DMA1 channel 2 -> GPIOB BSRR.
//!
//! Lines: PB3 CLK, PB4 SYNC, PB5 X, PB6 Y. Writing BSRR leaves the rest of
//! GPIOB alone.

use core::sync::atomic::{compiler_fence, Ordering};

use stm32f1xx_hal::{
    dma::{dma1, Event},
    pac::{DBGMCU, GPIOB, RCC, TIM2},
};

use super::encoder::{LineMap, WriteStyle};
use super::engine::{timer_reload, TransferEngine};

pub const LINES: LineMap = LineMap::single_ended(3, 4, 5, 6, WriteStyle::SetReset);

/// TIM2 counts 16 bit on this part
const TIM2_MAX_DIVIDER: u32 = 0x1_0000;

pub struct Tim2Dma1Ch2 {
    timer: TIM2,
    dma: dma1::C2,
    timer_clk: u32,
    units: usize,
}

impl Tim2Dma1Ch2 {
    /// `timer_clk`: TIM2 kernel clock, Hz
    pub fn new(timer: TIM2, dma: dma1::C2, timer_clk: u32) -> Self {
        Self {
            timer,
            dma,
            timer_clk,
            units: 0,
        }
    }

    /// Address every transfer goes to
    pub fn gpiob_bsrr() -> u32 {
        unsafe { &(*GPIOB::ptr()).bsrr as *const _ as u32 }
    }

    fn start_timer(&mut self) {
        self.timer.cnt.write(|w| unsafe { w.bits(0) });
        self.timer.cr1.modify(|_, w| w.cen().set_bit());
    }
}

impl TransferEngine for Tim2Dma1Ch2 {
    type Word = u32;

    fn set_destination_port(&mut self, address: u32) {
        self.dma.set_peripheral_address(address, false);
    }

    fn set_trigger_rate(&mut self, rate_hz: u32) {
        let rcc = unsafe { &*RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.tim2en().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim2rst().set_bit());
        compiler_fence(Ordering::SeqCst);
        rcc.apb1rstr.modify(|_, w| w.tim2rst().clear_bit());

        let tim = &self.timer;

        // no prescaler
        tim.psc.write(|w| unsafe { w.bits(0) });

        // autoreload
        let (arr, effective) = timer_reload(self.timer_clk, rate_hz, TIM2_MAX_DIVIDER);
        if effective != rate_hz {
            warn!(
                "TIM2: {} Hz requested, {} Hz generated from {} Hz",
                rate_hz, effective, self.timer_clk
            );
        }
        tim.arr.write(|w| unsafe { w.bits(arr) });

        // Trigger an update event to load the prescaler value to the clock
        tim.egr.write(|w| w.ug().set_bit());

        // reset DMA request
        tim.sr.modify(|_, w| w.uif().clear_bit());

        // DMA request on overflow
        tim.dier.write(|w| w.ude().set_bit());

        // freeze TIM2 while the core is halted by the debugger
        unsafe {
            (*DBGMCU::ptr())
                .cr
                .modify(|_, w| w.dbg_tim2_stop().set_bit());
        }

        debug!("TIM2: ARR={}, {} Hz", arr, effective);
    }

    fn configure(&mut self, source: *const u32, units: usize) {
        self.dma.stop();
        self.dma.set_memory_address(source as u32, true);
        self.dma.set_transfer_length(units);
        self.units = units;

        self.dma.ch().cr.modify(|_, w| {
            w.pl()
                .very_high() // prio
                .msize()
                .bits32() // 32 bit
                .psize()
                .bits32() // 32 bit
                .dir()
                .from_memory() // M -> p
                .teie()
                .disabled() // error irq - disable
                .htie()
                .disabled() // half transfer - disable
        });
    }

    fn disable_after_one_cycle(&mut self) {
        self.dma.ch().cr.modify(|_, w| w.circ().clear_bit());
    }

    fn enable_completion_interrupt(&mut self) {
        self.dma.listen(Event::TransferComplete);
    }

    fn clear_completion(&mut self) {
        self.dma.ifcr().write(|w| w.cgif2().set_bit());
        self.timer.cr1.modify(|_, w| w.cen().clear_bit());
    }

    fn arm(&mut self) {
        self.dma.start();
        self.start_timer();
    }

    fn rearm(&mut self, source: *const u32) {
        // the channel must be off while MAR/NDTR are reloaded
        self.dma.stop();
        self.dma.set_memory_address(source as u32, true);
        self.dma.set_transfer_length(self.units);

        self.arm();
    }
}
