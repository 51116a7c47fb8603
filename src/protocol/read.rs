//! This file implements receiving a message from the bus, forwarding it to
//! the host a byte at a time.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use super::bus::GpibBus;
use super::gpib::GpibDriver;
use super::types::{ReadEnd, ReadMode, ReadOutcome};
use crate::config::Config;
use crate::link::LinkWriter;
use crate::util::time::Clock;

impl<B: GpibBus, C: Clock> GpibDriver<B, C> {
    /// Receives bytes until `mode` says to stop, or a byte doesn't arrive
    /// within the timeout.
    ///
    /// Every byte is written to `link` as soon as it is received.  If end of
    /// transmission is enabled, the EOT character follows each byte received
    /// with EOI, whatever the mode.
    ///
    /// A timeout is the normal way for [`ReadMode::UntilTimeout`] to end, and
    /// for the others it just means the talker stopped early.  Either way
    /// whatever arrived has already been delivered, so there is no error.
    pub fn receive_message<L: LinkWriter + ?Sized>(
        &mut self,
        cfg: &Config,
        mode: ReadMode,
        link: &mut L,
    ) -> ReadOutcome {
        let mut bytes: u16 = 0;

        let end = loop {
            let (byte, eoi) = match self.receive_byte(cfg.mode, cfg.timeout()) {
                Ok(received) => received,
                Err(_) => break ReadEnd::Timeout,
            };
            bytes = bytes.saturating_add(1);

            link.write_byte(byte);
            match cfg.eot() {
                Some(eot) if eoi => link.write_byte(eot),
                _ => {}
            }

            match mode {
                ReadMode::UntilEoi if eoi => break ReadEnd::Eoi,
                ReadMode::UntilChar(c) if byte == c => break ReadEnd::Char,
                _ => {}
            }
        };

        debug!("Received {} bytes, ended by {:?}", bytes, end);
        ReadOutcome { bytes, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Role;
    use crate::test::sim::{SimBus, SimClock, Sourced};

    fn driver(queue: &[Sourced]) -> GpibDriver<SimBus, SimClock> {
        let mut driver = GpibDriver::new(SimBus::new(), SimClock::new());
        driver.init_pins(Role::Controller);
        driver.bus_mut().peer.queue.extend(queue.iter().copied());
        driver
    }

    fn cfg() -> Config {
        Config {
            timeout_ms: 20,
            ..Config::default()
        }
    }

    #[test]
    fn until_eoi_appends_eot() {
        let mut d = driver(&[
            Sourced::data(b'4'),
            Sourced::data(b'2'),
            Sourced::data_eoi(b'\r'),
            Sourced::data(b'x'),
        ]);
        let mut out = Vec::new();
        let outcome = d.receive_message(&cfg(), ReadMode::UntilEoi, &mut out);

        assert_eq!(out, b"42\r\n");
        assert_eq!(
            outcome,
            ReadOutcome {
                bytes: 3,
                end: ReadEnd::Eoi
            }
        );
        // The byte after EOI is left for the next read.
        assert_eq!(d.bus().peer.queue.len(), 1);
    }

    #[test]
    fn eot_disabled() {
        let mut d = driver(&[Sourced::data(b'A'), Sourced::data_eoi(b'B')]);
        let cfg = Config {
            eot_enable: false,
            ..cfg()
        };
        let mut out = Vec::new();
        d.receive_message(&cfg, ReadMode::UntilEoi, &mut out);
        assert_eq!(out, b"AB");
    }

    #[test]
    fn until_char_stops_on_match() {
        let mut d = driver(&[
            Sourced::data(b'1'),
            Sourced::data(b';'),
            Sourced::data(b'2'),
        ]);
        let mut out = Vec::new();
        let outcome = d.receive_message(&cfg(), ReadMode::UntilChar(b';'), &mut out);
        assert_eq!(out, b"1;");
        assert_eq!(outcome.end, ReadEnd::Char);
    }

    #[test]
    fn until_timeout_reads_past_eoi() {
        let mut d = driver(&[Sourced::data_eoi(b'a'), Sourced::data(b'b')]);
        let mut out = Vec::new();
        let outcome = d.receive_message(&cfg(), ReadMode::UntilTimeout, &mut out);
        assert_eq!(out, b"a\nb");
        assert_eq!(
            outcome,
            ReadOutcome {
                bytes: 2,
                end: ReadEnd::Timeout
            }
        );
    }

    #[test]
    fn partial_message_delivered_on_timeout() {
        let mut d = driver(&[Sourced::data(b'o'), Sourced::data(b'k')]);
        let mut out = Vec::new();
        let outcome = d.receive_message(&cfg(), ReadMode::UntilEoi, &mut out);
        assert_eq!(out, b"ok");
        assert_eq!(outcome.end, ReadEnd::Timeout);
        assert!(!d.clock().tick_running());
    }

    #[test]
    fn silent_talker() {
        let mut d = driver(&[]);
        let mut out = Vec::new();
        let outcome = d.receive_message(&cfg(), ReadMode::UntilChar(b'\n'), &mut out);
        assert!(out.is_empty());
        assert_eq!(outcome.bytes, 0);
    }
}
