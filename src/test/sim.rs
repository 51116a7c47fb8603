//! A simulated GPIB bus, with one scripted peer on the far side, and a
//! simulated millisecond clock.
//!
//! Lines are modelled as open collector: a line reads low if either side
//! drives it low, otherwise high.  The data lines are the wired AND of both
//! sides, with pull-ups.
//!
//! The peer takes a step every time the adapter samples the bus, so it reacts
//! to whatever the adapter last drove.  When the adapter has TE high the peer
//! is an acceptor, recording every byte it accepts.  Otherwise it is a
//! source, sending whatever is in its queue.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use std::cell::Cell;
use std::collections::VecDeque;

use crate::protocol::bus::{GpibBus, Lines};
use crate::util::time::Clock;

/// How the adapter is driving a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Low,
    High,
    Float,
}

/// A byte the peer accepted from the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub byte: u8,
    pub atn: bool,
    pub eoi: bool,
}

/// A byte for the peer to send to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sourced {
    pub byte: u8,
    pub eoi: bool,
    /// Send as a command - the peer asserts ATN while this byte is at the
    /// head of the queue.
    pub atn: bool,
}

impl Sourced {
    pub fn data(byte: u8) -> Self {
        Self {
            byte,
            eoi: false,
            atn: false,
        }
    }

    pub fn data_eoi(byte: u8) -> Self {
        Self {
            byte,
            eoi: true,
            atn: false,
        }
    }

    pub fn command(byte: u8) -> Self {
        Self {
            byte,
            eoi: false,
            atn: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AcceptorState {
    #[default]
    Idle,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SourceState {
    #[default]
    Idle,
    Valid,
}

/// The device (or controller) on the other side of the bus.
#[derive(Debug, Default)]
pub struct SimPeer {
    /// Bytes accepted so far.
    pub accepted: Vec<Accepted>,

    /// Bytes still to send.
    pub queue: VecDeque<Sourced>,

    /// Nobody there - NRFD and NDAC are never pulled.
    pub absent: bool,

    /// Acceptor never releases NRFD.
    pub never_ready: bool,

    /// Acceptor never releases NDAC.
    pub no_ack: bool,

    /// Steps the acceptor takes to become ready for each byte.
    pub ready_delay: u32,

    /// Source never releases DAV once asserted.
    pub hold_dav: bool,

    /// Assert ATN regardless of the queue.
    pub hold_atn: bool,

    /// Assert IFC.
    pub ifc: bool,

    /// Assert SRQ.
    pub srq: bool,

    acceptor: AcceptorState,
    stall: u32,
    source: SourceState,
}

impl SimPeer {
    fn atn(&self) -> bool {
        self.hold_atn || self.queue.front().is_some_and(|s| s.atn)
    }
}

/// See the module documentation.
#[derive(Debug)]
pub struct SimBus {
    /// The far side of the bus.  Tests set it up and inspect it directly.
    pub peer: SimPeer,

    // What the adapter is driving.
    local_low: Lines,
    local_high: Lines,
    local_data: Option<u8>,

    // What the peer is driving.  The peer only ever pulls low.
    peer_low: Lines,
    peer_data: Option<u8>,

    ifc_pulses: u32,
    steps: u64,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            peer: SimPeer::default(),
            local_low: Lines::empty(),
            local_high: Lines::empty(),
            local_data: None,
            peer_low: Lines::empty(),
            peer_data: None,
            ifc_pulses: 0,
            steps: 0,
        }
    }

    /// How the adapter is driving `line`.
    pub fn drive_of(&self, line: Lines) -> Drive {
        if self.local_low.contains(line) {
            Drive::Low
        } else if self.local_high.contains(line) {
            Drive::High
        } else {
            Drive::Float
        }
    }

    /// The value the adapter is driving onto the data lines, if any.
    pub fn data_drive(&self) -> Option<u8> {
        self.local_data
    }

    /// Times the adapter has asserted IFC.
    pub fn ifc_pulses(&self) -> u32 {
        self.ifc_pulses
    }

    /// Times the adapter has sampled the bus.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Bytes the peer accepted, without the ATN/EOI detail.
    pub fn accepted_bytes(&self) -> Vec<u8> {
        self.peer.accepted.iter().map(|a| a.byte).collect()
    }

    /// Commands (bytes under ATN) the peer accepted.
    pub fn accepted_commands(&self) -> Vec<u8> {
        self.peer
            .accepted
            .iter()
            .filter(|a| a.atn)
            .map(|a| a.byte)
            .collect()
    }

    /// Data (bytes without ATN) the peer accepted.
    pub fn accepted_data(&self) -> Vec<u8> {
        self.peer
            .accepted
            .iter()
            .filter(|a| !a.atn)
            .map(|a| a.byte)
            .collect()
    }

    // Level of a line, without letting the peer step.
    fn level_low(&self, line: Lines) -> bool {
        self.local_low.contains(line) || self.peer_low.contains(line)
    }

    fn data_level(&self) -> u8 {
        self.local_data.unwrap_or(0xff) & self.peer_data.unwrap_or(0xff)
    }

    fn step(&mut self) {
        self.steps += 1;

        let mut pull = Lines::empty();
        if self.peer.ifc {
            pull |= Lines::IFC;
        }
        if self.peer.srq {
            pull |= Lines::SRQ;
        }

        let talking = self.local_high.contains(Lines::TE);
        if talking {
            self.peer.source = SourceState::Idle;
            self.peer_data = None;
            if !self.peer.absent {
                pull |= self.step_acceptor();
            }
        } else {
            self.peer.acceptor = AcceptorState::Idle;
            pull |= self.step_source();
        }

        if self.peer.atn() {
            pull |= Lines::ATN;
        }
        self.peer_low = pull;
    }

    fn step_acceptor(&mut self) -> Lines {
        let dav = self.level_low(Lines::DAV);
        let peer = &mut self.peer;
        match peer.acceptor {
            AcceptorState::Idle => {
                let ready = !peer.never_ready && peer.stall >= peer.ready_delay;
                if dav && ready {
                    let atn = self.local_low.contains(Lines::ATN) || peer.atn();
                    let eoi = self.local_low.contains(Lines::EOI);
                    let byte = !self.local_data.unwrap_or(0xff);
                    peer.accepted.push(Accepted { byte, atn, eoi });
                    peer.acceptor = AcceptorState::Accepted;
                } else if !ready {
                    peer.stall = peer.stall.saturating_add(1);
                }
            }
            AcceptorState::Accepted => {
                if !dav {
                    peer.acceptor = AcceptorState::Idle;
                    peer.stall = 0;
                }
            }
        }

        let ready = !peer.never_ready && peer.stall >= peer.ready_delay;
        match peer.acceptor {
            AcceptorState::Idle if ready => Lines::NDAC,
            AcceptorState::Idle => Lines::NDAC | Lines::NRFD,
            AcceptorState::Accepted if peer.no_ack => Lines::NDAC | Lines::NRFD,
            AcceptorState::Accepted => Lines::NRFD,
        }
    }

    fn step_source(&mut self) -> Lines {
        let nrfd_high = !self.level_low(Lines::NRFD);
        let ndac_high = !self.level_low(Lines::NDAC);
        match self.peer.source {
            SourceState::Idle => {
                if nrfd_high && !self.peer.queue.is_empty() {
                    self.peer.source = SourceState::Valid;
                }
            }
            SourceState::Valid => {
                if ndac_high && !self.peer.hold_dav {
                    self.peer.queue.pop_front();
                    self.peer.source = SourceState::Idle;
                }
            }
        }

        match (self.peer.source, self.peer.queue.front()) {
            (SourceState::Valid, Some(s)) => {
                self.peer_data = Some(!s.byte);
                if s.eoi {
                    Lines::DAV | Lines::EOI
                } else {
                    Lines::DAV
                }
            }
            _ => {
                self.peer_data = None;
                Lines::empty()
            }
        }
    }
}

impl GpibBus for SimBus {
    fn drive_low(&mut self, lines: Lines) {
        if lines.contains(Lines::IFC) && !self.local_low.contains(Lines::IFC) {
            self.ifc_pulses += 1;
        }
        self.local_low |= lines;
        self.local_high -= lines;
    }

    fn drive_high(&mut self, lines: Lines) {
        self.local_high |= lines;
        self.local_low -= lines;
    }

    fn float(&mut self, lines: Lines) {
        self.local_low -= lines;
        self.local_high -= lines;
    }

    fn is_high(&mut self, line: Lines) -> bool {
        self.step();
        !self.level_low(line)
    }

    fn drive_data(&mut self, port: u8) {
        self.local_data = Some(port);
    }

    fn float_data(&mut self) {
        self.local_data = None;
    }

    fn read_data(&mut self) -> u8 {
        self.step();
        self.data_level()
    }
}

/// A clock which advances 1ms every time it is read.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Cell<u32>,
    delayed_us: Cell<u64>,
    tick_enables: Cell<u32>,
    tick_running: Cell<bool>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u32) -> Self {
        let clock = Self::default();
        clock.now.set(ms);
        clock
    }

    /// The current time, without advancing it.
    pub fn peek(&self) -> u32 {
        self.now.get()
    }

    /// Total microseconds spent in `delay_us`.
    pub fn delayed_us(&self) -> u64 {
        self.delayed_us.get()
    }

    pub fn tick_enables(&self) -> u32 {
        self.tick_enables.get()
    }

    pub fn tick_running(&self) -> bool {
        self.tick_running.get()
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }

    fn delay_us(&self, us: u32) {
        self.delayed_us.set(self.delayed_us.get() + us as u64);
    }

    fn tick_enable(&self) {
        assert!(!self.tick_running.get(), "tick enabled twice");
        self.tick_enables.set(self.tick_enables.get() + 1);
        self.tick_running.set(true);
    }

    fn tick_disable(&self) {
        self.tick_running.set(false);
    }
}
