//! The host link - the byte stream to and from the host (USB CDC-ACM on
//! target).
//!
//! Inbound bytes are framed into records by [`ring`].  Outbound bytes go
//! through a [`LinkWriter`], which the protocol handler uses both for raw bus
//! data and for textual replies.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub mod ring;

pub use ring::{Consumer, FramedRing, Producer, Push, RecordBuf};

use core::fmt;

/// Sink for bytes heading to the host.
///
/// Writes never fail from the caller's point of view.  An implementation
/// which cannot deliver (host disconnected, buffer full) drops the bytes.
pub trait LinkWriter {
    fn write_byte(&mut self, byte: u8);

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }
}

impl<L: LinkWriter + ?Sized> LinkWriter for &mut L {
    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes);
    }
}

/// Collects output into a fixed capacity buffer, dropping anything which
/// doesn't fit.
impl<const N: usize> LinkWriter for heapless::Vec<u8, N> {
    fn write_byte(&mut self, byte: u8) {
        let _ = self.push(byte);
    }
}

/// Adapts a [`LinkWriter`] for use with `core::fmt`.
pub struct LinkFmt<'a, L: LinkWriter + ?Sized>(pub &'a mut L);

impl<L: LinkWriter + ?Sized> fmt::Write for LinkFmt<'_, L> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Writes a textual reply, followed by the end of transmission character if
/// one is configured.
pub fn eot_write<L: LinkWriter + ?Sized>(link: &mut L, eot: Option<u8>, args: fmt::Arguments<'_>) {
    // LinkFmt never returns an error.
    let _ = fmt::write(&mut LinkFmt(&mut *link), args);
    if let Some(c) = eot {
        link.write_byte(c);
    }
}

#[cfg(test)]
impl LinkWriter for Vec<u8> {
    fn write_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}
