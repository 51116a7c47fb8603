//! This module contains constants for pico488.
//!
//! Bus command byte values live with the command decoder in
//! [`crate::protocol::command`].  Everything else which is fixed at build
//! time is here.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use static_assertions::const_assert;

//
// Host link framing
//

/// Size of the framed ring buffer.  The cursors are u8, so wraparound is
/// implicit at this size.
pub const RING_LEN: usize = 256;

/// Bytes of header before each framed record's payload - command flag and
/// length.
pub const RECORD_HEADER_LEN: usize = 2;

/// Longest payload a single record can carry.  A record of this length plus
/// its header fills all but one byte of the ring, which is the most it can
/// ever hold, as read == write has to mean empty.
pub const MAX_RECORD_PAYLOAD: usize = RING_LEN - RECORD_HEADER_LEN - 1;

const_assert!(RING_LEN == 256);
const_assert!(MAX_RECORD_PAYLOAD <= u8::MAX as usize);

/// Escape character on the host link.  The next byte is stored literally.
pub const LINK_ESC: u8 = 0x1b;

/// Character used to introduce a command, when doubled at line start.
pub const LINK_PLUS: u8 = b'+';

pub const LINK_CR: u8 = b'\r';
pub const LINK_LF: u8 = b'\n';

//
// Bus timing
//

/// Default handshake timeout.
pub const DEFAULT_TIMEOUT_MS: u16 = 1000;

/// Largest handshake timeout that can be configured.
pub const MAX_TIMEOUT_MS: u16 = 3000;

/// How long IFC is held asserted when clearing the interface.
pub const IFC_PULSE_US: u32 = 150;

//
// Addressing
//

/// The adapter's own primary address when acting as controller.
pub const CONTROLLER_ADDR: u8 = 0;

/// Lowest and highest device primary address.
pub const MIN_PAD: u8 = 1;
pub const MAX_PAD: u8 = 30;

/// Highest secondary address.  Stored 0-30, sent as 0x60 + sad.
pub const MAX_SAD: u8 = 30;

/// Offset the user adds to a secondary address when typing it.
pub const SAD_USER_OFFSET: u8 = 0x60;

/// Most addresses a single group trigger can target.
pub const MAX_TRIGGER_ADDRESSES: usize = 15;

const_assert!(MAX_PAD < 31);
const_assert!(MAX_SAD < 31);

//
// Persisted configuration
//

/// First byte of the persisted configuration image.  If the stored byte
/// doesn't match, the image is ignored and defaults are written back.
pub const CONFIG_VERSION_CODE: u8 = 0xA1;

/// Length of the persisted configuration image.
pub const CONFIG_IMAGE_LEN: usize = 12;

//
// Replies
//

/// Firmware version reported by `++ver`.
pub const VERSION_MAJOR: u8 = 6;
pub const VERSION_MINOR_A: u8 = 0;
pub const VERSION_MINOR_B: u8 = 0;

/// Pointer reported by `++help`.
pub const HELP_URL: &str = "https://github.com/steve1515/gpibusb-firmware";

//
// Firmware only constants
//

#[cfg(feature = "firmware")]
pub use firmware::*;

#[cfg(feature = "firmware")]
mod firmware {
    use embassy_time::Duration;

    /// Stack size for core 1, which runs the protocol handler.
    pub const CORE1_STACK_SIZE: usize = 8192;

    /// pid.codes test VID/PID.
    pub const USB_VENDOR_ID: u16 = 0x1209;
    pub const USB_PRODUCT_ID: u16 = 0x0001;
    pub const USB_MANUFACTURER: &str = "piers.rocks";
    pub const USB_PRODUCT: &str = "pico488";
    pub const USB_SERIAL: &str = "000001";
    pub const USB_POWER_MA: u16 = 100;
    pub const MAX_PACKET_SIZE_0: u8 = 64;

    /// Max packet size for the CDC-ACM data endpoints.
    pub const MAX_EP_PACKET_SIZE: u16 = 64;
    pub const MAX_EP_PACKET_SIZE_USIZE: usize = MAX_EP_PACKET_SIZE as usize;

    /// Size of the buffer between the protocol handler and the USB IN
    /// endpoint.
    pub const LINK_TX_BUF_SIZE: usize = 256;

    /// How long the protocol handler pauses between main loop iterations so
    /// other core 1 work can run.  Kept low, as bus state can change at any
    /// time.
    pub const PROTOCOL_LOOP_TIMER: Duration = Duration::from_micros(10);

    /// How often we aim to log from our primary loops to prove they are
    /// still alive.
    pub const LOOP_LOG_INTERVAL: Duration = Duration::from_secs(5);

    /// Delay between receiving `++rst` and resetting.
    pub const RESET_DELAY_MS: u64 = 1;

    /// Flash size of the board, used to locate the config sector.
    #[cfg(feature = "pico")]
    pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
    #[cfg(feature = "pico2")]
    pub const FLASH_SIZE: usize = 4 * 1024 * 1024;

    /// Erase granularity of the on-board flash.
    pub const FLASH_SECTOR_SIZE: u32 = 4096;

    /// The config image lives in the last flash sector.
    pub const CONFIG_FLASH_OFFSET: u32 = FLASH_SIZE as u32 - FLASH_SECTOR_SIZE;
}
