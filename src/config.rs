//! Adapter configuration.
//!
//! [`Config`] is owned by the protocol handler and passed by reference into
//! each bus operation.  The persisted part of it round trips through a small
//! versioned image, which a [`ConfigStore`] keeps somewhere non-volatile (the
//! last flash sector on target).

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use crate::constants::{
    CONFIG_IMAGE_LEN, CONFIG_VERSION_CODE, DEFAULT_TIMEOUT_MS, MAX_PAD, MAX_SAD, MAX_TIMEOUT_MS,
    MIN_PAD,
};
use crate::protocol::types::{Address, EosMode, Role};

/// A persisted configuration image.
pub type ConfigImage = [u8; CONFIG_IMAGE_LEN];

// Image layout
const OFF_VERSION: usize = 0;
const OFF_MODE: usize = 1;
const OFF_PAD: usize = 2;
const OFF_SAD: usize = 3;
const OFF_USE_SAD: usize = 4;
const OFF_AUTO_READ: usize = 5;
const OFF_USE_EOI: usize = 6;
const OFF_EOS: usize = 7;
const OFF_EOT_ENABLE: usize = 8;
const OFF_EOT_CHAR: usize = 9;
const OFF_TIMEOUT_LO: usize = 10;
const OFF_TIMEOUT_HI: usize = 11;

/// Why a stored image was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Nothing stored, or stored by an incompatible firmware
    #[error("config version code mismatch")]
    BadVersion,

    /// A field holds a value that can't be configured
    #[error("config field out of range")]
    OutOfRange,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Controller or device.
    pub mode: Role,

    /// The device being controlled (controller role) or this adapter's own
    /// address (device role).
    pub pad: u8,
    pub sad: u8,
    pub use_sad: bool,

    /// Read back from the device after sending it data.
    pub auto_read: bool,

    /// Assert EOI with the last byte sent.
    pub use_eoi: bool,

    /// Terminator appended to data sent.
    pub eos: EosMode,

    /// Character sent to the host after a byte received with EOI, and after
    /// textual replies.
    pub eot_enable: bool,
    pub eot_char: u8,

    /// Handshake timeout, 0-3000ms.
    pub timeout_ms: u16,

    // The following are not persisted.
    /// Persist every change.
    pub save_cfg: bool,

    /// Device role only - receive everything regardless of addressing.
    pub listen_only: bool,

    /// Report errors to the host.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Role::Controller,
            pad: 1,
            sad: 0,
            use_sad: false,
            auto_read: true,
            use_eoi: true,
            eos: EosMode::CrLf,
            eot_enable: true,
            eot_char: b'\n',
            timeout_ms: DEFAULT_TIMEOUT_MS,
            save_cfg: false,
            listen_only: false,
            debug: false,
        }
    }
}

impl Config {
    /// The configured device address.
    pub fn address(&self) -> Address {
        Address::new(self.pad, self.use_sad.then_some(self.sad))
    }

    pub fn set_address(&mut self, address: Address) {
        self.pad = address.pad;
        self.sad = address.sad.unwrap_or(0);
        self.use_sad = address.sad.is_some();
    }

    /// The end of transmission character, if enabled.
    pub fn eot(&self) -> Option<u8> {
        self.eot_enable.then_some(self.eot_char)
    }

    pub fn timeout(&self) -> u32 {
        self.timeout_ms as u32
    }

    /// Builds the persisted image.
    pub fn encode(&self) -> ConfigImage {
        let mut image = [0; CONFIG_IMAGE_LEN];
        let [lo, hi] = self.timeout_ms.to_le_bytes();
        image[OFF_VERSION] = CONFIG_VERSION_CODE;
        image[OFF_MODE] = self.mode.as_u8();
        image[OFF_PAD] = self.pad;
        image[OFF_SAD] = self.sad;
        image[OFF_USE_SAD] = self.use_sad as u8;
        image[OFF_AUTO_READ] = self.auto_read as u8;
        image[OFF_USE_EOI] = self.use_eoi as u8;
        image[OFF_EOS] = self.eos.as_u8();
        image[OFF_EOT_ENABLE] = self.eot_enable as u8;
        image[OFF_EOT_CHAR] = self.eot_char;
        image[OFF_TIMEOUT_LO] = lo;
        image[OFF_TIMEOUT_HI] = hi;
        image
    }

    /// Parses a persisted image.  Runtime-only fields take their defaults.
    pub fn decode(image: &ConfigImage) -> Result<Self, ConfigError> {
        if image[OFF_VERSION] != CONFIG_VERSION_CODE {
            return Err(ConfigError::BadVersion);
        }

        let mode = Role::from_u8(image[OFF_MODE]).ok_or(ConfigError::OutOfRange)?;
        let eos = EosMode::from_u8(image[OFF_EOS]).ok_or(ConfigError::OutOfRange)?;
        let pad = image[OFF_PAD];
        let sad = image[OFF_SAD];
        let timeout_ms = u16::from_le_bytes([image[OFF_TIMEOUT_LO], image[OFF_TIMEOUT_HI]]);
        if !(MIN_PAD..=MAX_PAD).contains(&pad) || sad > MAX_SAD || timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::OutOfRange);
        }

        Ok(Self {
            mode,
            pad,
            sad,
            use_sad: image[OFF_USE_SAD] != 0,
            auto_read: image[OFF_AUTO_READ] != 0,
            use_eoi: image[OFF_USE_EOI] != 0,
            eos,
            eot_enable: image[OFF_EOT_ENABLE] != 0,
            eot_char: image[OFF_EOT_CHAR],
            timeout_ms,
            ..Self::default()
        })
    }

    /// Loads the stored configuration.  If there isn't a usable one, the
    /// defaults are stored and returned.
    pub fn load<S: ConfigStore + ?Sized>(store: &mut S) -> Self {
        match store.load().map(|image| Self::decode(&image)) {
            Some(Ok(config)) => {
                info!("Loaded config: mode {:?} pad {}", config.mode, config.pad);
                config
            }
            Some(Err(e)) => {
                warn!("Stored config rejected: {:?}, using defaults", e);
                Self::store_defaults(store)
            }
            None => {
                info!("No stored config, using defaults");
                Self::store_defaults(store)
            }
        }
    }

    fn store_defaults<S: ConfigStore + ?Sized>(store: &mut S) -> Self {
        let config = Self::default();
        store.save(&config.encode());
        config
    }

    /// Called after any persisted field changes.  Saves if saving is
    /// enabled.
    pub fn changed<S: ConfigStore + ?Sized>(&self, store: &mut S) {
        if self.save_cfg {
            self.save(store);
        }
    }

    /// Saves unconditionally.
    pub fn save<S: ConfigStore + ?Sized>(&self, store: &mut S) {
        debug!("Saving config");
        store.save(&self.encode());
    }
}

/// Somewhere to keep the configuration image.
pub trait ConfigStore {
    /// Returns the stored image, if there is one.
    fn load(&mut self) -> Option<ConfigImage>;

    /// Stores `image`.  Implementations should avoid rewriting an identical
    /// image, to spare the flash.
    fn save(&mut self, image: &ConfigImage);
}

/// A [`ConfigStore`] which keeps the image in RAM.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    image: Option<ConfigImage>,
    writes: u32,
}

impl MemoryStore {
    pub const fn new() -> Self {
        Self {
            image: None,
            writes: 0,
        }
    }

    pub const fn with_image(image: ConfigImage) -> Self {
        Self {
            image: Some(image),
            writes: 0,
        }
    }

    /// Number of times the image has actually changed.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub fn image(&self) -> Option<&ConfigImage> {
        self.image.as_ref()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&mut self) -> Option<ConfigImage> {
        self.image
    }

    fn save(&mut self, image: &ConfigImage) {
        if self.image.as_ref() != Some(image) {
            self.image = Some(*image);
            self.writes += 1;
        }
    }
}
