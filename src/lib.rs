//! pico488
//!
//! This implements a USB to GPIB (IEEE-488) adapter.  The host talks to it
//! over a USB serial port, sending data lines to go out on the bus and `++`
//! commands to configure the adapter.  It can act as the bus's system
//! controller, or as a device on a bus controlled by something else, and
//! can listen to all bus traffic in listen-only mode.
//!
//! Everything except the firmware glue is hardware agnostic, reaching the bus
//! only through [`protocol::GpibBus`], and is tested on the host.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#![cfg_attr(not(test), no_std)]

// Provide some feature guidance when compiling the firmware.
#[cfg(all(feature = "firmware", not(any(feature = "pico", feature = "pico2"))))]
compile_error!("Either 'pico' or 'pico2' feature must be enabled to build the firmware");
#[cfg(all(feature = "pico", feature = "pico2"))]
compile_error!("Features 'pico' and 'pico2' cannot be enabled simultaneously");

// Declare all of this library's modules.
pub mod commands;
pub mod config;
pub mod constants;
pub mod link;
pub mod protocol;
pub mod util;

#[cfg(test)]
mod test;

#[cfg(feature = "firmware")]
mod entry;
#[cfg(feature = "firmware")]
mod infra;
#[cfg(feature = "firmware")]
mod task;
#[cfg(feature = "firmware")]
mod usb;

#[cfg(feature = "firmware")]
pub use entry::common_main;

// Extra binary information that picotool can read.
#[cfg(feature = "firmware")]
#[unsafe(link_section = ".bi_entries")]
#[used]
pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
    embassy_rp::binary_info::rp_program_name!(c"pico488 by piers.rocks"),
    embassy_rp::binary_info::rp_program_description!(c"A USB to GPIB (IEEE-488) adapter, acting as controller or device."),
    embassy_rp::binary_info::rp_cargo_version!(),
    embassy_rp::binary_info::rp_program_build_attribute!(),
];

// A note about Statics
//
// Statics are used to avoid lifetime issues when spawning tasks, and to
// share the two cross-core channels - the framed ring and the transmit pipe.
//
// - Use StaticCell for statics that cannot be initialized at compile time.
//
// - Use ConstStaticCell for statics that can be initialized at compile time,
//   but are take()n once and then owned mutably.
//
// - Statics shared between the cores use CriticalSectionRawMutex, or are
//   lock-free, like the framed ring.
