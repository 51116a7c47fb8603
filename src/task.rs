//! Implements task handling support, including dual core support.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};
use cortex_m::peripheral::SCB;
use embassy_executor::{Executor, Spawner};
use embassy_rp::multicore::{Stack, spawn_core1 as rp_spawn_core1};
use embassy_rp::peripherals::CORE1;
use embassy_time::{Instant, Timer};
use static_cell::{ConstStaticCell, StaticCell};

use crate::config::Config;
use crate::constants::{CORE1_STACK_SIZE, LOOP_LOG_INTERVAL, PROTOCOL_LOOP_TIMER, RESET_DELAY_MS};
use crate::infra::flash::{FlashStore, SignalStore, config_task};
use crate::infra::gpio::RpBus;
use crate::link::{Consumer, Producer};
use crate::protocol::{LoopOutcome, ProtocolHandler};
use crate::usb::{PipeLink, UsbStack, link_rx_task, link_tx_task, usb_task};
use crate::util::time::{EmbassyClock, yield_ms};

// Threading and tasks model
//
// Core 0 runs main(), and the tasks which talk to the outside world - the
// embassy USB stack, the CDC-ACM receive and transmit tasks and the config
// task, which does the flash writes.
//
// Core 1 runs only the protocol handler.  Its bus handshakes busy-wait, for
// up to the configured timeout, and it must never be held up by USB.  The
// two cores meet at the framed ring (host to bus), the transmit pipe (bus to
// host) and the config signal.
//
// Core 0 tasks are spawned using the Spawner passed to main(), core 1's via
// its own Executor.

// A stack for core 1.
static CORE1_STACK: ConstStaticCell<Stack<CORE1_STACK_SIZE>> = ConstStaticCell::new(Stack::new());

// An executor for core 1.
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

/// Everything the protocol handler owns, moved across to core 1.
pub struct ProtocolResources {
    pub handler: ProtocolHandler<RpBus, EmbassyClock>,
    pub records: Consumer<'static>,
    pub config: Config,
    pub store: SignalStore,
}

/// Starts core 1, running the protocol handler.
pub fn core1_spawn(p_core1: CORE1, resources: ProtocolResources) {
    rp_spawn_core1(p_core1, CORE1_STACK.take(), move || {
        let executor1 = EXECUTOR1.init(Executor::new());
        executor1.run(|spawner| {
            spawn_or_reboot(spawner.spawn(protocol_task(resources)), "Protocol Handler");
        })
    });
}

#[embassy_executor::task]
async fn protocol_task(resources: ProtocolResources) -> ! {
    let core = embassy_rp::pac::SIO.cpuid().read();
    info!("Core{}: Protocol handler started", core);

    let ProtocolResources {
        mut handler,
        mut records,
        mut config,
        mut store,
    } = resources;
    let mut link = PipeLink;

    handler.boot(&config);

    let mut last_log = Instant::now();
    loop {
        if handler.run_once(&mut records, &mut config, &mut store, &mut link) == LoopOutcome::Reset {
            // Give the reply and any pending flash write a moment.
            yield_ms!(RESET_DELAY_MS);
            SCB::sys_reset();
        }

        if last_log.elapsed() >= LOOP_LOG_INTERVAL {
            trace!("Core{}: Protocol handler loop running as {:?}", core, config.mode);
            last_log = Instant::now();
        }

        Timer::after(PROTOCOL_LOOP_TIMER).await;
    }
}

/// Spawns a task, or resets if it can't be.  Can be called on either core.
///
/// Spawning fails if too many instances of that task are already running,
/// which can only happen if tasks are spawned other than at start of day.
pub fn spawn_or_reboot<E: defmt::Format>(spawn_result: Result<(), E>, task_name: &str) {
    let core = embassy_rp::pac::SIO.cpuid().read();
    match spawn_result {
        Ok(()) => debug!("Core{}: Spawned task {}", core, task_name),
        Err(e) => {
            error!("Core{}: Failed to spawn task: {}, error: {}", core, task_name, e);
            SCB::sys_reset();
        }
    }
}

/// Spawns the core 0 tasks.
pub fn core0_spawn(spawner: &Spawner, usb: UsbStack, records: Producer<'static>, flash: FlashStore) {
    spawn_or_reboot(spawner.spawn(usb_task(usb.device)), "USB");
    spawn_or_reboot(spawner.spawn(link_rx_task(usb.rx, records)), "Link RX");
    spawn_or_reboot(spawner.spawn(link_tx_task(usb.tx)), "Link TX");
    spawn_or_reboot(spawner.spawn(config_task(flash)), "Config");
}
