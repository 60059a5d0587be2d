#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::{UART1, USB};
use embassy_rp::uart::{Config as UartConfig, Uart};
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig, Handler};
use firmware::{configure_usb_hid, UsbHidOutput};
use static_cell::StaticCell;
use swicc_engine::engine::FREE_RUN_PERIOD_US;
use swicc_engine::{command, CommandParser, Effect, Engine, ResponseWriter};

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART1_IRQ => embassy_rp::uart::InterruptHandler<UART1>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// The engine lives behind a single blocking critical-section mutex: a
/// task locks it only to read or mutate a handful of fields, never
/// across an `.await`, so the lock is always held for a bounded, short
/// time regardless of which task holds it.
static ENGINE: StaticCell<Mutex<CriticalSectionRawMutex, RefCell<Engine>>> = StaticCell::new();

/// "A new frame was produced" signal, latest-value-wins (there is
/// nothing to carry in the payload — the output task just re-reads
/// the engine's report), the same pattern the teacher used for
/// gamepad state.
static TICK_SIGNAL: StaticCell<Signal<CriticalSectionRawMutex, ()>> = StaticCell::new();

static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static HID_STATE: StaticCell<State> = StaticCell::new();
static USB_HANDLER: StaticCell<UsbConnectionHandler> = StaticCell::new();

/// Tracks live USB mount state on `Engine` via `embassy-usb`'s device
/// state callbacks, the same live signal the original firmware wires
/// through `tud_mount_cb`/`tud_umount_cb`/`tud_suspend_cb`/`tud_resume_cb`
/// rather than a one-shot flag set at first enumeration.
struct UsbConnectionHandler {
    engine: &'static Mutex<CriticalSectionRawMutex, RefCell<Engine>>,
}

impl Handler for UsbConnectionHandler {
    fn enabled(&mut self, enabled: bool) {
        if !enabled {
            self.engine.lock(|cell| cell.borrow_mut().set_usb_connected(false));
        }
    }

    fn reset(&mut self) {
        self.engine.lock(|cell| cell.borrow_mut().set_usb_connected(false));
    }

    fn configured(&mut self, configured: bool) {
        self.engine.lock(|cell| cell.borrow_mut().set_usb_connected(configured));
    }

    fn suspended(&mut self, suspended: bool) {
        if suspended {
            self.engine.lock(|cell| cell.borrow_mut().set_usb_connected(false));
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("SwiCC firmware starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    let engine = ENGINE.init(Mutex::new(RefCell::new(Engine::new())));
    let tick_signal = TICK_SIGNAL.init(Signal::new());

    // --- UART setup ---
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = 115_200;
    let uart = Uart::new(
        p.UART1,
        p.PIN_8, // TX
        p.PIN_9, // RX
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        uart_config,
    );
    let (tx, rx) = uart.split();

    // --- External vsync input ---
    let vsync_in = Input::new(p.PIN_16, Pull::Down);

    // --- Status LED (stand-in for the debug neopixel; monochrome) ---
    let led = Output::new(p.PIN_25, Level::Low);

    // --- USB setup ---
    let usb_driver = Driver::new(p.USB, Irqs);
    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("SwiCC");
    usb_config.product = Some("SwiCC Gamepad Bridge");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    let hid_state = HID_STATE.init(State::new());
    let hid_writer = configure_usb_hid(&mut builder, hid_state);

    let usb_handler = USB_HANDLER.init(UsbConnectionHandler { engine });
    builder.handler(usb_handler);

    let usb_device = builder.build();
    let usb_output = UsbHidOutput::new(hid_writer);

    spawner.spawn(usb_task(usb_device)).unwrap();
    spawner.spawn(uart_task(rx, tx, engine)).unwrap();
    spawner.spawn(ticker_task(engine, vsync_in, tick_signal)).unwrap();
    spawner.spawn(output_task(usb_output, engine, tick_signal)).unwrap();
    spawner.spawn(indicator_task(engine, led)).unwrap();

    info!("SwiCC firmware initialized");
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Writes a dispatched command's reply bytes into a bounded scratch
/// buffer. Overflow is silently dropped, matching the UART peripheral's
/// own "drop on a full TX FIFO" behavior rather than blocking or
/// panicking.
struct ReplyBuf {
    buf: heapless::Vec<u8, 1024>,
}

impl ResponseWriter for ReplyBuf {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let _ = self.buf.extend_from_slice(bytes);
    }
}

/// Command task (C2/C3): feeds each incoming byte through the
/// line parser and dispatches completed lines against the engine.
#[embassy_executor::task]
async fn uart_task(
    mut rx: embassy_rp::uart::UartRx<'static, embassy_rp::uart::Async>,
    mut tx: embassy_rp::uart::UartTx<'static, embassy_rp::uart::Async>,
    engine: &'static Mutex<CriticalSectionRawMutex, RefCell<Engine>>,
) {
    let mut parser = CommandParser::new();
    let mut byte = [0u8; 1];
    loop {
        if let Err(e) = rx.read(&mut byte).await {
            error!("uart rx error: {:?}", e);
            continue;
        }
        let Some(line) = parser.feed(byte[0]) else {
            continue;
        };
        let mut reply = ReplyBuf { buf: heapless::Vec::new() };
        let effect =
            engine.lock(|cell| command::dispatch(line, &mut cell.borrow_mut(), &mut reply));
        if !reply.buf.is_empty() {
            if let Err(e) = tx.write(&reply.buf).await {
                error!("uart tx error: {:?}", e);
            }
        }
        // Hardware interrupt enable/disable for the vsync pin is handled
        // implicitly by ticker_task polling `vsync_enabled()` each
        // iteration; only logging reacts to the effect here.
        if let Effect::SetVsyncHardware(enabled) = effect {
            info!("vsync sync now {}", enabled);
        }
    }
}

/// Frame ticker (C4/C5): free-running on a fixed period while vsync
/// sync is disabled, or driven by the external vsync input while it is
/// enabled. In sync mode, each rising edge reprograms the single
/// pending frame-update deadline — a burst of edges before the
/// previous one fires collapses to just the latest edge's deadline,
/// the same "one hardware alarm register, always reprogrammed"
/// behavior the original interrupt-driven firmware implemented.
#[embassy_executor::task]
async fn ticker_task(
    engine: &'static Mutex<CriticalSectionRawMutex, RefCell<Engine>>,
    mut vsync_in: Input<'static>,
    tick_signal: &'static Signal<CriticalSectionRawMutex, ()>,
) {
    let period = Duration::from_micros(u64::from(FREE_RUN_PERIOD_US));
    let mut free_run_deadline = Instant::now() + period;
    let mut pending_frame_deadline: Option<Instant> = None;

    let mut was_vsync_en = false;

    loop {
        let vsync_en = engine.lock(|cell| cell.borrow().vsync_enabled());

        if !vsync_en {
            if was_vsync_en {
                // Coming back from external sync: `free_run_deadline` was
                // never advanced while vsync drove ticking and is now far
                // in the past. Re-arm it relative to "now" instead of
                // replaying a burst of overdue ticks to catch up, mirroring
                // `alarm_in_us` being re-armed relative to "now" on
                // `VSYNC 0` rather than reusing a stale absolute deadline.
                free_run_deadline = Instant::now() + period;
            }
            was_vsync_en = false;
            pending_frame_deadline = None;
            Timer::at(free_run_deadline).await;
            free_run_deadline += period;
            engine.lock(|cell| cell.borrow_mut().tick_free_run());
            tick_signal.signal(());
            continue;
        }
        was_vsync_en = true;

        match pending_frame_deadline {
            None => {
                vsync_in.wait_for_rising_edge().await;
                let delay_us = engine.lock(|cell| {
                    cell.borrow_mut().on_vsync_edge();
                    cell.borrow().frame_delay_us()
                });
                pending_frame_deadline =
                    Some(Instant::now() + Duration::from_micros(u64::from(delay_us)));
            }
            Some(deadline) => {
                match select(vsync_in.wait_for_rising_edge(), Timer::at(deadline)).await {
                    Either::First(()) => {
                        let delay_us = engine.lock(|cell| {
                            cell.borrow_mut().on_vsync_edge();
                            cell.borrow().frame_delay_us()
                        });
                        pending_frame_deadline =
                            Some(Instant::now() + Duration::from_micros(u64::from(delay_us)));
                    }
                    Either::Second(()) => {
                        engine.lock(|cell| cell.borrow_mut().on_frame_update());
                        tick_signal.signal(());
                        pending_frame_deadline = None;
                    }
                }
            }
        }
    }
}

/// Output task (C8): waits for the ticker's signal and forwards the
/// engine's current report to the USB HID endpoint.
#[embassy_executor::task]
async fn output_task(
    mut output: UsbHidOutput<'static>,
    engine: &'static Mutex<CriticalSectionRawMutex, RefCell<Engine>>,
    tick_signal: &'static Signal<CriticalSectionRawMutex, ()>,
) {
    // Mount state itself now tracks live via `UsbConnectionHandler`'s
    // `configured`/`reset`/`suspended` callbacks; this wait is only to
    // avoid writing to the endpoint before the class is ready.
    output.wait_ready().await;
    info!("USB HID ready, forwarding controller state...");
    loop {
        tick_signal.wait().await;
        let report = engine.lock(|cell| cell.borrow().report());
        if let Err(e) = output.send(report).await {
            error!("usb output error: {:?}", e);
        }
    }
}

/// Status LED heartbeat (C9). Physical pixel driving is out of scope —
/// this drives a plain on/off LED as a monochrome stand-in for the
/// original's WS2812 debug pixel, lighting it whenever either the
/// heartbeat flash or the USB-mounted indicator would show any color.
#[embassy_executor::task]
async fn indicator_task(
    engine: &'static Mutex<CriticalSectionRawMutex, RefCell<Engine>>,
    mut led: Output<'static>,
) {
    loop {
        let (vsync_count, usb_mounted, led_on) = engine.lock(|cell| {
            let e = cell.borrow();
            (e.vsync_count(), e.usb_connected(), e.led_on())
        });
        let (r, _g, b) = swicc_engine::heartbeat_color(vsync_count, usb_mounted, led_on);
        if r > 0 || b > 0 {
            led.set_high();
        } else {
            led.set_low();
        }
        Timer::after(Duration::from_millis(5)).await;
    }
}
