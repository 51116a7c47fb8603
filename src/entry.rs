//! Firmware entry point, called from the binary's `main()`.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};
use embassy_executor::Spawner;
use embassy_time::Timer;
use static_cell::StaticCell;

use crate::config::Config;
use crate::constants::LOOP_LOG_INTERVAL;
use crate::infra::flash::{FlashStore, SignalStore};
use crate::infra::gpio::{BusPins, RpBus};
use crate::link::FramedRing;
use crate::protocol::ProtocolHandler;
use crate::task::{ProtocolResources, core0_spawn, core1_spawn};
use crate::usb::UsbStack;
use crate::util::built::log_fw_info;
use crate::util::time::EmbassyClock;

// Records from the host, produced on core 0 and consumed on core 1.
static RING: StaticCell<FramedRing> = StaticCell::new();

/// Brings up the hardware, spawns every task, then idles on core 0.
pub async fn common_main(spawner: Spawner, bin_name: &'static str) -> ! {
    let p = embassy_rp::init(Default::default());

    info!("-----");
    log_fw_info(bin_name);
    info!("-----");

    // Load the config on core 0, before anything else can touch flash.
    let mut flash = FlashStore::new(p.FLASH);
    let config = Config::load(&mut flash);
    let store = SignalStore::new(config.encode());
    debug!("Config: {:?} PAD {} timeout {}ms", config.mode, config.pad, config.timeout_ms);

    // Pin order must match Lines, see infra::gpio::config.
    let bus = RpBus::new(BusPins {
        lines: [
            p.PIN_10.into(),
            p.PIN_11.into(),
            p.PIN_12.into(),
            p.PIN_13.into(),
            p.PIN_14.into(),
            p.PIN_15.into(),
            p.PIN_16.into(),
            p.PIN_17.into(),
            p.PIN_18.into(),
            p.PIN_19.into(),
            p.PIN_20.into(),
            p.PIN_21.into(),
        ],
        data: [
            p.PIN_2.into(),
            p.PIN_3.into(),
            p.PIN_4.into(),
            p.PIN_5.into(),
            p.PIN_6.into(),
            p.PIN_7.into(),
            p.PIN_8.into(),
            p.PIN_9.into(),
        ],
    });

    let (producer, consumer) = RING.init(FramedRing::new()).split();

    let usb = UsbStack::create_static(p.USB);
    core0_spawn(&spawner, usb, producer, flash);

    core1_spawn(
        p.CORE1,
        ProtocolResources {
            handler: ProtocolHandler::new(bus, EmbassyClock),
            records: consumer,
            config,
            store,
        },
    );

    loop {
        Timer::after(LOOP_LOG_INTERVAL).await;
        trace!("Core0: Main loop running");
    }
}
