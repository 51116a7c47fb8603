//! The framed ring buffer sitting between the host link receive path and the
//! protocol handler.
//!
//! The receive side ([`Producer`]) turns the raw link byte stream into
//! records, applying the escape/terminator policy as bytes arrive.  The
//! protocol handler ([`Consumer`]) pops one complete record at a time.  Each
//! record is stored as:
//!
//! ```text
//! | flag | len | payload (len bytes) ... |
//! ```
//!
//! where `flag` is 1 for a `++` command, 0 for device data.
//!
//! The ring is 256 bytes with u8 cursors:
//! - `read` points at the next record to be popped, and is only written by
//!   the consumer.
//! - `write` points at the first free byte, and is only written by the
//!   producer.
//! - `read == write` means empty.  The producer never lets its cursor land on
//!   `read`, so the ring is never full, and a record that would cause that is
//!   dropped in its entirety.
//!
//! The producer only publishes `write` (with Release) after the whole record,
//! header included, is in place, so the consumer never sees a partial record.
//! The consumer only publishes `read` (with Release) after copying the record
//! out, so the producer never overwrites bytes still being read.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use core::cell::UnsafeCell;
use portable_atomic::{AtomicU8, Ordering};

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use crate::constants::{
    LINK_CR, LINK_ESC, LINK_LF, LINK_PLUS, MAX_RECORD_PAYLOAD, RECORD_HEADER_LEN, RING_LEN,
};

/// A position in the ring.  All arithmetic wraps at the ring size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingIndex(u8);

impl RingIndex {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// The position `n` bytes after this one.
    #[inline]
    pub const fn add(self, n: u8) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// The position after this one.
    #[inline]
    pub const fn next(self) -> Self {
        self.add(1)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// The shared storage.  Create one (statically on target) and [`split`] it
/// into its two halves.
///
/// [`split`]: FramedRing::split
pub struct FramedRing {
    buf: [UnsafeCell<u8>; RING_LEN],
    read: AtomicU8,
    write: AtomicU8,
}

// Safety: bytes in `buf` are only ever accessed by one side at a time.  The
// producer writes only between `write` and `read`, which the consumer never
// reads.  The consumer reads only between `read` and `write`, which the
// producer never writes.  Ownership of a region passes across by the Release
// store of the relevant cursor, matched by an Acquire load on the other side.
unsafe impl Sync for FramedRing {}

impl Default for FramedRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FramedRing {
    pub const fn new() -> Self {
        Self {
            buf: [const { UnsafeCell::new(0) }; RING_LEN],
            read: AtomicU8::new(0),
            write: AtomicU8::new(0),
        }
    }

    /// Splits the ring into its producer and consumer halves.  Taking `&mut
    /// self` guarantees there is only ever one of each.
    pub fn split(&mut self) -> (Producer<'_>, Consumer<'_>) {
        let ring: &FramedRing = self;
        (Producer::new(ring), Consumer { ring })
    }

    #[inline]
    fn load(&self, index: RingIndex) -> u8 {
        // Safety: see the Sync impl - callers only touch bytes they own.
        unsafe { *self.buf[index.as_usize()].get() }
    }

    #[inline]
    fn store(&self, index: RingIndex, value: u8) {
        // Safety: see the Sync impl - callers only touch bytes they own.
        unsafe { *self.buf[index.as_usize()].get() = value }
    }
}

/// What happened to the record in progress after a byte was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Push {
    /// Byte consumed, and the record is still open.
    Open,
    /// A record was completed and is now visible to the consumer.
    Published,
    /// A terminator arrived with nothing to store.
    Empty,
    /// The record would have collided with unread data and was dropped.
    Overflow,
}

impl Push {
    /// Whether the record in progress has finished, one way or another.
    pub fn ends_record(self) -> bool {
        !matches!(self, Push::Open)
    }
}

/// The receive side of the ring.  Lives in the link receive task (an
/// interrupt on simpler hardware), and is never blocked by the consumer.
pub struct Producer<'a> {
    ring: &'a FramedRing,

    // Where the record in progress starts, and where its next byte goes.
    start: RingIndex,
    cursor: RingIndex,

    // Payload bytes stored so far.
    len: u8,

    // Raw bytes seen for this record, and the first two of them, which
    // decide whether it is a command.
    raw: u8,
    lead: [u8; 2],

    // The next byte is to be stored literally.
    escape: bool,
}

impl<'a> Producer<'a> {
    fn new(ring: &'a FramedRing) -> Self {
        let start = RingIndex(ring.write.load(Ordering::Relaxed));
        Self {
            ring,
            start,
            cursor: start,
            len: 0,
            raw: 0,
            lead: [0; 2],
            escape: false,
        }
    }

    /// Handles one byte from the host link.
    ///
    /// - An unescaped ESC makes the following byte literal.
    /// - Unescaped CR or LF ends the record.
    /// - Unescaped `+` is discarded, except that a record whose first two raw
    ///   bytes are `++` is a command, and keeps that `++` at the start of its
    ///   payload.
    /// - A record reaching [`MAX_RECORD_PAYLOAD`] bytes is published as is.
    pub fn push_byte(&mut self, c: u8) -> Push {
        self.raw = self.raw.saturating_add(1);
        match self.raw {
            1 => self.lead[0] = c,
            2 => self.lead[1] = c,
            _ => (),
        }

        if !self.escape {
            match c {
                LINK_ESC => {
                    self.escape = true;
                    return Push::Open;
                }
                LINK_PLUS => {
                    // Only the second of a leading "++" pair is acted on, and
                    // it stores both.
                    if self.raw == 2 && self.lead[0] == LINK_PLUS {
                        if self.store(LINK_PLUS).is_err() || self.store(LINK_PLUS).is_err() {
                            return self.overflow();
                        }
                    }
                    return Push::Open;
                }
                LINK_CR | LINK_LF => {
                    return if self.len == 0 {
                        self.reset();
                        Push::Empty
                    } else {
                        self.publish()
                    };
                }
                _ => (),
            }
        }

        self.escape = false;
        if self.store(c).is_err() {
            return self.overflow();
        }

        if self.len as usize >= MAX_RECORD_PAYLOAD {
            trace!("Record reached maximum length, publishing");
            return self.publish();
        }

        Push::Open
    }

    /// Handles one receive event's worth of bytes.  Once a record ends, any
    /// bytes left in `bytes` are dropped.  A record can be split over
    /// several calls.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> Push {
        for (ii, &c) in bytes.iter().enumerate() {
            let result = self.push_byte(c);
            if result.ends_record() {
                let dropped = bytes.len() - ii - 1;
                if dropped > 0 {
                    trace!("Dropped {} bytes after end of record", dropped);
                }
                return result;
            }
        }
        Push::Open
    }

    /// Drops the record in progress, if any.  Used when the host link goes
    /// away, so a part line can't be joined to the next session's first.
    pub fn discard(&mut self) {
        if self.raw > 0 {
            debug!("Discarded unterminated record of {} bytes", self.len);
        }
        self.reset();
    }

    fn is_command(&self) -> bool {
        self.lead == [LINK_PLUS, LINK_PLUS]
    }

    // Advances the cursor, failing if it would land on the read cursor.
    fn advance(&mut self) -> Result<(), ()> {
        let next = self.cursor.next();
        if next.raw() == self.ring.read.load(Ordering::Acquire) {
            return Err(());
        }
        self.cursor = next;
        Ok(())
    }

    // Stores a payload byte, reserving the header first if this is the
    // first byte of the record.
    fn store(&mut self, c: u8) -> Result<(), ()> {
        if self.len == 0 {
            self.start = RingIndex(self.ring.write.load(Ordering::Relaxed));
            self.cursor = self.start;
            for _ in 0..RECORD_HEADER_LEN {
                self.advance()?;
            }
        }
        let at = self.cursor;
        self.advance()?;
        self.ring.store(at, c);
        self.len += 1;
        Ok(())
    }

    fn publish(&mut self) -> Push {
        self.ring.store(self.start, self.is_command() as u8);
        self.ring.store(self.start.next(), self.len);
        self.ring.write.store(self.cursor.raw(), Ordering::Release);
        trace!(
            "Published record: command {}, len {}",
            self.is_command(),
            self.len
        );
        self.reset();
        Push::Published
    }

    fn overflow(&mut self) -> Push {
        // Nothing was published, so forgetting the record rolls it back.
        debug!("Ring full, dropped record of {} bytes", self.len);
        self.reset();
        Push::Overflow
    }

    fn reset(&mut self) {
        self.len = 0;
        self.raw = 0;
        self.lead = [0; 2];
        self.escape = false;
        self.start = RingIndex(self.ring.write.load(Ordering::Relaxed));
        self.cursor = self.start;
    }
}

/// A copy of a single popped record.
///
/// One byte larger than the largest possible record, and zero-filled before
/// each pop, so the payload is always followed by a NUL.
pub struct RecordBuf {
    bytes: [u8; RING_LEN],
}

impl Default for RecordBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBuf {
    pub const fn new() -> Self {
        Self {
            bytes: [0; RING_LEN],
        }
    }

    pub fn is_command(&self) -> bool {
        self.bytes[0] != 0
    }

    pub fn len(&self) -> usize {
        self.bytes[1] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[RECORD_HEADER_LEN..RECORD_HEADER_LEN + self.len()]
    }

    /// The whole buffer, header included.
    pub fn as_bytes(&self) -> &[u8; RING_LEN] {
        &self.bytes
    }
}

/// The protocol handler's side of the ring.
pub struct Consumer<'a> {
    ring: &'a FramedRing,
}

impl Consumer<'_> {
    pub fn is_empty(&self) -> bool {
        self.ring.read.load(Ordering::Relaxed) == self.ring.write.load(Ordering::Acquire)
    }

    /// Copies the oldest record into `dst` and frees it from the ring.
    /// Returns false, leaving `dst` untouched, if there is none.
    pub fn pop_record(&mut self, dst: &mut RecordBuf) -> bool {
        let read = RingIndex(self.ring.read.load(Ordering::Relaxed));
        let write = RingIndex(self.ring.write.load(Ordering::Acquire));
        if read == write {
            return false;
        }

        dst.bytes.fill(0);

        let len = self.ring.load(read.next()) as usize;
        let total = len + RECORD_HEADER_LEN;

        // The record may straddle the end of the ring, in which case it is
        // copied in two pieces.
        let first = total.min(RING_LEN - read.as_usize());
        for (ii, byte) in dst.bytes[..first].iter_mut().enumerate() {
            *byte = self.ring.load(read.add(ii as u8));
        }
        for (ii, byte) in dst.bytes[first..total].iter_mut().enumerate() {
            *byte = self.ring.load(RingIndex(ii as u8));
        }

        self.ring
            .read
            .store(read.add(total as u8).raw(), Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pop(rx: &mut Consumer<'_>) -> Option<(bool, Vec<u8>)> {
        let mut buf = RecordBuf::new();
        rx.pop_record(&mut buf)
            .then(|| (buf.is_command(), buf.payload().to_vec()))
    }

    fn line(len: usize, fill: u8) -> Vec<u8> {
        let mut bytes = vec![fill; len];
        bytes.push(b'\n');
        bytes
    }

    #[test]
    fn command_record() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(b"++read\r\n"), Push::Published);
        assert_eq!(pop(&mut rx), Some((true, b"++read".to_vec())));
        assert_eq!(pop(&mut rx), None);
    }

    #[test]
    fn escaped_plus_is_data() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(b"\x1b+\x1b+data\r"), Push::Published);
        assert_eq!(pop(&mut rx), Some((false, b"++data".to_vec())));
        assert!(rx.is_empty());
    }

    #[test]
    fn unescaped_plus_discarded() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        tx.push_chunk(b"a++b+c\n");
        assert_eq!(pop(&mut rx), Some((false, b"abc".to_vec())));

        tx.push_chunk(b"+5\n");
        assert_eq!(pop(&mut rx), Some((false, b"5".to_vec())));
    }

    #[test]
    fn escape_can_be_escaped() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        tx.push_chunk(b"\x1b\x1b\x1b\r\x1b\nx\r");
        assert_eq!(pop(&mut rx), Some((false, b"\x1b\r\nx".to_vec())));
    }

    #[test]
    fn bytes_after_terminator_dropped() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(b"one\r\ntwo\r\n"), Push::Published);
        assert_eq!(pop(&mut rx), Some((false, b"one".to_vec())));
        assert_eq!(pop(&mut rx), None);
    }

    #[test]
    fn record_spans_chunks() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(b"+"), Push::Open);
        assert_eq!(tx.push_chunk(b"+ad"), Push::Open);
        assert!(rx.is_empty());
        assert_eq!(tx.push_chunk(b"dr 5\n"), Push::Published);
        assert_eq!(pop(&mut rx), Some((true, b"++addr 5".to_vec())));
    }

    #[test]
    fn discard_drops_part_record() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(b"++ad"), Push::Open);
        tx.discard();
        assert!(rx.is_empty());

        assert_eq!(tx.push_chunk(b"dr 5\n"), Push::Published);
        assert_eq!(pop(&mut rx), Some((false, b"dr 5".to_vec())));
        assert!(rx.is_empty());

        // An escape pending at the time is forgotten too.
        tx.push_chunk(b"\x1b");
        tx.discard();
        assert_eq!(tx.push_chunk(b"\n"), Push::Empty);
    }

    #[test]
    fn empty_line_not_stored() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(b"\r\n"), Push::Empty);
        assert_eq!(tx.push_chunk(b"\n"), Push::Empty);
        assert_eq!(tx.push_chunk(b"++\n"), Push::Published);
        assert_eq!(pop(&mut rx), Some((true, b"++".to_vec())));
        assert!(rx.is_empty());
    }

    #[test]
    fn record_count_matches_terminators() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        let lines: [&[u8]; 6] = [b"*IDN?\n", b"++ver\r", b"x\n", b"\n", b"MEAS\x1b\n\n", b"++ addr\n"];
        for l in lines {
            tx.push_chunk(l);
        }
        let mut count = 0;
        while pop(&mut rx).is_some() {
            count += 1;
        }
        // The lone "\n" is an empty record.
        assert_eq!(count, 5);
    }

    #[test]
    fn collision_drops_whole_record() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(&line(100, b'a')), Push::Published);
        assert_eq!(tx.push_chunk(&line(100, b'b')), Push::Published);

        // 204 bytes used, 62 more would collide.
        assert_eq!(tx.push_chunk(&line(60, b'c')), Push::Overflow);

        assert_eq!(pop(&mut rx), Some((false, vec![b'a'; 100])));
        assert_eq!(pop(&mut rx), Some((false, vec![b'b'; 100])));
        assert_eq!(pop(&mut rx), None);

        // Space freed, so the same record now fits.
        assert_eq!(tx.push_chunk(&line(60, b'c')), Push::Published);
        assert_eq!(pop(&mut rx), Some((false, vec![b'c'; 60])));
    }

    #[test]
    fn collision_mid_record_then_recovers() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(&line(200, b'a')), Push::Published);
        // Overflows part way through the payload.
        assert_eq!(tx.push_chunk(&[b'z'; 60]), Push::Overflow);
        assert_eq!(pop(&mut rx), Some((false, vec![b'a'; 200])));
        assert!(rx.is_empty());
    }

    #[test]
    fn pop_straddles_end_of_ring() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        tx.push_chunk(&line(200, b'a'));
        assert!(pop(&mut rx).is_some());

        // Starts at 202, wraps at 256.
        let payload: Vec<u8> = (0..100u8).map(|b| b'0' + b % 10).collect();
        let mut bytes = payload.clone();
        bytes.push(b'\r');
        assert_eq!(tx.push_chunk(&bytes), Push::Published);

        let mut buf = RecordBuf::new();
        assert!(rx.pop_record(&mut buf));
        assert!(!buf.is_command());
        assert_eq!(buf.payload(), payload.as_slice());
        assert!(buf.as_bytes()[2 + 100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn pop_zero_fills_previous_contents() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();
        let mut buf = RecordBuf::new();

        tx.push_chunk(b"longer record\n");
        assert!(rx.pop_record(&mut buf));
        tx.push_chunk(b"ab\n");
        assert!(rx.pop_record(&mut buf));
        assert_eq!(buf.payload(), b"ab");
        assert_eq!(buf.as_bytes()[4], 0);
    }

    #[test]
    fn long_record_published_at_maximum() {
        let mut ring = FramedRing::new();
        let (mut tx, mut rx) = ring.split();

        assert_eq!(tx.push_chunk(&[b'x'; 300]), Push::Published);
        let mut buf = RecordBuf::new();
        assert!(rx.pop_record(&mut buf));
        assert_eq!(buf.len(), MAX_RECORD_PAYLOAD);
        assert_eq!(buf.as_bytes()[RING_LEN - 1], 0);
    }

    #[test]
    fn index_wraps() {
        assert_eq!(RingIndex::new(255).next(), RingIndex::new(0));
        assert_eq!(RingIndex::new(250).add(10).raw(), 4);
    }
}
