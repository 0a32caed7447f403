#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_abort as _;

use usb_device::UsbError;
use usbd_serial::SerialPort;

use stm32f1xx_hal::usb::UsbBusType;

use xy2_100::Handoff;

/// Frame slots, read by DMA1 channel 2
static GALVO: Handoff<u32> = Handoff::new();

defmt::timestamp!("{=u64:ms}", app::monotonics::now().ticks());

#[rtic::app(device = stm32f1xx_hal::pac, peripherals = true, dispatchers = [USART1])]
mod app {
    use core::fmt::Write;

    use stm32f1xx_hal::{
        dma::DmaExt,
        gpio::{IOPinSpeed, OutputSpeed, PinState},
        prelude::*,
        usb::{Peripheral, UsbBus, UsbBusType},
    };
    use systick_monotonic::{fugit::ExtU64, Systick};
    use usb_device::{bus::UsbBusAllocator, prelude::*};
    use usbd_serial::SerialPort;

    use rtic::mutex_prelude::*;

    use xy2_100::{
        command::{self, LineReader, Reply},
        config,
        control::xy2_100::tim2_gpiob_3456::{Tim2Dma1Ch2, LINES},
        pattern::Pattern,
        CompletionCoordinator, Config, Sample, Transmitter, XY2_100,
    };

    #[monotonic(binds = SysTick, default = true)]
    type Mono = Systick<1000>;

    #[shared]
    struct Shared {
        tx: Transmitter<u32>,
        pattern: Pattern,
    }

    #[local]
    struct Local {
        irq: CompletionCoordinator<Tim2Dma1Ch2>,
        usb_dev: UsbDevice<'static, UsbBusType>,
        serial: SerialPort<'static, UsbBusType>,
        reader: LineReader<{ config::COMMAND_LINE_LEN }>,
    }

    #[init(local = [usb_bus: Option<UsbBusAllocator<UsbBusType>> = None])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        defmt::info!("++ Start up! ++");

        let mut flash = cx.device.FLASH.constrain();
        let rcc = cx.device.RCC.constrain();

        let clocks = rcc
            .cfgr
            .use_hse(8.MHz())
            .sysclk(72.MHz())
            .pclk1(36.MHz())
            .freeze(&mut flash.acr);
        defmt::assert!(clocks.usbclk_valid());

        defmt::info!(
            "Clocks: SYSCLK={} Hz, TIM2={} Hz",
            clocks.sysclk().raw(),
            clocks.pclk1_tim().raw()
        );

        let mono = Systick::new(cx.core.SYST, clocks.sysclk().raw());

        let mut afio = cx.device.AFIO.constrain();
        let mut gpioa = cx.device.GPIOA.split();
        let mut gpiob = cx.device.GPIOB.split();

        // PB3, PB4 belong to JTAG after reset
        let (_pa15, pb3, pb4) = afio.mapr.disable_jtag(gpioa.pa15, gpiob.pb3, gpiob.pb4);

        let mut clk = pb3.into_push_pull_output_with_state(&mut gpiob.crl, PinState::Low);
        let mut sync = pb4.into_push_pull_output_with_state(&mut gpiob.crl, PinState::Low);
        let mut x = gpiob
            .pb5
            .into_push_pull_output_with_state(&mut gpiob.crl, PinState::Low);
        let mut y = gpiob
            .pb6
            .into_push_pull_output_with_state(&mut gpiob.crl, PinState::Low);
        clk.set_speed(&mut gpiob.crl, IOPinSpeed::Mhz50);
        sync.set_speed(&mut gpiob.crl, IOPinSpeed::Mhz50);
        x.set_speed(&mut gpiob.crl, IOPinSpeed::Mhz50);
        y.set_speed(&mut gpiob.crl, IOPinSpeed::Mhz50);

        defmt::info!("XY2-100: TIM2 -> DMA1 CH2 -> GPIOB BSRR, PB3..PB6");
        let dma1 = cx.device.DMA1.split();
        let engine = Tim2Dma1Ch2::new(cx.device.TIM2, dma1.2, clocks.pclk1_tim().raw());
        let galvo = XY2_100::new(
            &crate::GALVO,
            engine,
            Config::new(Tim2Dma1Ch2::gpiob_bsrr(), LINES),
        )
        .unwrap_or_else(|e| defmt::panic!("XY2-100 config: {}", e));

        let (mut tx, irq) = galvo.begin();
        tx.set_sample(Sample::CENTER);

        // force host re-enumeration
        let mut usb_dp = gpioa.pa12.into_push_pull_output(&mut gpioa.crh);
        usb_dp.set_low();
        cortex_m::asm::delay(clocks.sysclk().raw() / 100);

        defmt::info!("Creating usb low-level driver: PA11, PA12");
        let usb_bus: &'static _ = cx.local.usb_bus.insert(UsbBus::new(Peripheral {
            usb: cx.device.USB,
            pin_dm: gpioa.pa11,
            pin_dp: usb_dp.into_floating_input(&mut gpioa.crh),
        }));

        let serial = SerialPort::new(usb_bus);

        let vid_pid = UsbVidPid(config::USB_VID, config::USB_PID);
        defmt::info!("Building usb device: vid={} pid={}", vid_pid.0, vid_pid.1);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, vid_pid)
            .manufacturer(config::USB_MANUFACTURER)
            .product(config::USB_PRODUCT)
            .serial_number(config::USB_SERIAL)
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        if pattern_step::spawn().is_err() {
            defmt::warn!("pattern task already queued");
        }

        (
            Shared {
                tx,
                pattern: Pattern::default(),
            },
            Local {
                irq,
                usb_dev,
                serial,
                reader: LineReader::new(),
            },
            init::Monotonics(mono),
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    /// Frame boundary, must preempt everything else
    #[task(binds = DMA1_CHANNEL2, priority = 3, local = [irq])]
    fn dma1_ch2(cx: dma1_ch2::Context) {
        cx.local.irq.on_transfer_complete();
    }

    #[task(binds = USB_LP_CAN_RX0, priority = 1, shared = [tx, pattern], local = [usb_dev, serial, reader])]
    fn usb_rx(cx: usb_rx::Context) {
        let usb_dev = cx.local.usb_dev;
        let serial = cx.local.serial;
        let reader = cx.local.reader;

        if !usb_dev.poll(&mut [serial]) {
            return;
        }

        let mut buf = [0u8; 64];
        let count = match serial.read(&mut buf) {
            Ok(count) => count,
            Err(_) => return,
        };
        defmt::trace!("Serial> Ressived {} bytes", count);

        (cx.shared.tx, cx.shared.pattern).lock(|tx, pattern| {
            for &byte in &buf[..count] {
                let reply = match reader.feed(byte) {
                    Some(Ok(cmd)) => command::execute(cmd, tx, pattern),
                    Some(Err(e)) => {
                        defmt::warn!("Serial: {}", e);
                        Reply::Err(e)
                    }
                    None => continue,
                };

                let mut line = heapless::String::<{ config::COMMAND_LINE_LEN }>::new();
                let _ = write!(&mut line, "{}\r\n", reply);
                crate::write_reply(serial, line.as_bytes());
            }
        });
    }

    #[task(priority = 1, shared = [tx, pattern])]
    fn pattern_step(cx: pattern_step::Context) {
        (cx.shared.tx, cx.shared.pattern).lock(|tx, pattern| {
            if let Some(sample) = pattern.next() {
                tx.set_sample(sample);
            }
        });

        if pattern_step::spawn_after((config::PATTERN_STEP_MS as u64).millis()).is_err() {
            defmt::warn!("pattern task queue full");
        }
    }
}

/// Pushes `data` into the CDC endpoint, dropping what does not fit.
fn write_reply(serial: &mut SerialPort<'static, UsbBusType>, mut data: &[u8]) {
    while !data.is_empty() {
        match serial.write(data) {
            Ok(len) if len > 0 => data = &data[len..],
            Ok(_) | Err(UsbError::WouldBlock) => {
                defmt::warn!("Serial: reply dropped, {} bytes", data.len());
                return;
            }
            Err(_) => return,
        }
    }
}
