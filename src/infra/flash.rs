//! Persists the configuration image in the last sector of the on-board
//! flash.
//!
//! Flash is only ever touched from core 0.  The protocol handler on core 1
//! saves through a [`SignalStore`], which hands the image over to
//! [`config_task`].

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::config::{ConfigImage, ConfigStore};
use crate::constants::{CONFIG_FLASH_OFFSET, CONFIG_IMAGE_LEN, FLASH_SECTOR_SIZE, FLASH_SIZE};

// Images waiting to be written.  Only the latest matters.
static CONFIG_SAVE: Signal<CriticalSectionRawMutex, ConfigImage> = Signal::new();

/// [`ConfigStore`] directly on flash.
pub struct FlashStore {
    flash: Flash<'static, FLASH, Blocking, FLASH_SIZE>,
}

impl FlashStore {
    pub fn new(p_flash: FLASH) -> Self {
        Self {
            flash: Flash::new_blocking(p_flash),
        }
    }
}

impl ConfigStore for FlashStore {
    fn load(&mut self) -> Option<ConfigImage> {
        let mut image = [0; CONFIG_IMAGE_LEN];
        match self.flash.blocking_read(CONFIG_FLASH_OFFSET, &mut image) {
            Ok(()) => Some(image),
            Err(e) => {
                warn!("Failed to read config from flash: {:?}", e);
                None
            }
        }
    }

    fn save(&mut self, image: &ConfigImage) {
        if self.load().as_ref() == Some(image) {
            trace!("Config unchanged, not writing flash");
            return;
        }

        let end = CONFIG_FLASH_OFFSET + FLASH_SECTOR_SIZE;
        if let Err(e) = self.flash.blocking_erase(CONFIG_FLASH_OFFSET, end) {
            error!("Failed to erase config sector: {:?}", e);
            return;
        }
        match self.flash.blocking_write(CONFIG_FLASH_OFFSET, image) {
            Ok(()) => info!("Config saved"),
            Err(e) => error!("Failed to write config: {:?}", e),
        }
    }
}

/// [`ConfigStore`] for core 1.  Saves are passed to [`config_task`] and
/// loads return the last image saved.
pub struct SignalStore {
    last: ConfigImage,
}

impl SignalStore {
    /// `current` is the image the configuration was loaded from.
    pub fn new(current: ConfigImage) -> Self {
        Self { last: current }
    }
}

impl ConfigStore for SignalStore {
    fn load(&mut self) -> Option<ConfigImage> {
        Some(self.last)
    }

    fn save(&mut self, image: &ConfigImage) {
        self.last = *image;
        CONFIG_SAVE.signal(*image);
    }
}

/// Writes configuration images to flash as core 1 saves them.
#[embassy_executor::task]
pub async fn config_task(mut store: FlashStore) -> ! {
    let core = embassy_rp::pac::SIO.cpuid().read();
    info!("Core{}: Config task started", core);

    loop {
        let image = CONFIG_SAVE.wait().await;
        store.save(&image);
    }
}
