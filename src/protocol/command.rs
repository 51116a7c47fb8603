//! Decoding of bytes sent on the bus while ATN is asserted.
//!
//! Command bytes are decoded once, as they come off the bus, into a
//! [`BusCommand`], and the rest of the protocol code matches on that.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

/// Go To Local
pub const CMD_GTL: u8 = 0x01;
/// Selected Device Clear
pub const CMD_SDC: u8 = 0x04;
/// Parallel Poll Configure
pub const CMD_PPC: u8 = 0x05;
/// Group Execute Trigger
pub const CMD_GET: u8 = 0x08;
/// Take Control
pub const CMD_TCT: u8 = 0x09;
/// Local Lockout
pub const CMD_LLO: u8 = 0x11;
/// Device Clear
pub const CMD_DCL: u8 = 0x14;
/// Parallel Poll Unconfigure
pub const CMD_PPU: u8 = 0x15;
/// Serial Poll Enable
pub const CMD_SPE: u8 = 0x18;
/// Serial Poll Disable
pub const CMD_SPD: u8 = 0x19;
/// Unlisten
pub const CMD_UNL: u8 = 0x3f;
/// Untalk
pub const CMD_UNT: u8 = 0x5f;

/// Listen address group base, 0x20 + pad
pub const LISTEN_BASE: u8 = 0x20;
/// Talk address group base, 0x40 + pad
pub const TALK_BASE: u8 = 0x40;
/// Secondary command group base, 0x60 + sad
pub const SECONDARY_BASE: u8 = 0x60;

// Mask selecting the address group bits.
const GROUP_MASK: u8 = 0x60;
const ADDRESS_MASK: u8 = 0x1f;

/// A decoded command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusCommand {
    Gtl,
    Sdc,
    Ppc,
    Get,
    Tct,
    Llo,
    Dcl,
    Ppu,
    Spe,
    Spd,
    /// My Listen Address, for the contained primary address
    Listen(u8),
    Unlisten,
    /// My Talk Address, for the contained primary address
    Talk(u8),
    Untalk,
    /// Secondary address, or parallel poll enable/disable
    Secondary(u8),
    /// Any other universal or addressed command
    Other(u8),
}

impl BusCommand {
    /// Decodes a byte received under ATN.  DIO8 is ignored, as it carries
    /// no meaning in a command.
    pub const fn from_byte(byte: u8) -> Self {
        let byte = byte & 0x7f;
        match byte {
            CMD_GTL => BusCommand::Gtl,
            CMD_SDC => BusCommand::Sdc,
            CMD_PPC => BusCommand::Ppc,
            CMD_GET => BusCommand::Get,
            CMD_TCT => BusCommand::Tct,
            CMD_LLO => BusCommand::Llo,
            CMD_DCL => BusCommand::Dcl,
            CMD_PPU => BusCommand::Ppu,
            CMD_SPE => BusCommand::Spe,
            CMD_SPD => BusCommand::Spd,
            CMD_UNL => BusCommand::Unlisten,
            CMD_UNT => BusCommand::Untalk,
            _ => match byte & GROUP_MASK {
                LISTEN_BASE => BusCommand::Listen(byte & ADDRESS_MASK),
                TALK_BASE => BusCommand::Talk(byte & ADDRESS_MASK),
                SECONDARY_BASE => BusCommand::Secondary(byte & ADDRESS_MASK),
                _ => BusCommand::Other(byte),
            },
        }
    }

    /// The byte to send for this command.
    pub const fn to_byte(self) -> u8 {
        match self {
            BusCommand::Gtl => CMD_GTL,
            BusCommand::Sdc => CMD_SDC,
            BusCommand::Ppc => CMD_PPC,
            BusCommand::Get => CMD_GET,
            BusCommand::Tct => CMD_TCT,
            BusCommand::Llo => CMD_LLO,
            BusCommand::Dcl => CMD_DCL,
            BusCommand::Ppu => CMD_PPU,
            BusCommand::Spe => CMD_SPE,
            BusCommand::Spd => CMD_SPD,
            BusCommand::Listen(pad) => LISTEN_BASE | (pad & ADDRESS_MASK),
            BusCommand::Unlisten => CMD_UNL,
            BusCommand::Talk(pad) => TALK_BASE | (pad & ADDRESS_MASK),
            BusCommand::Untalk => CMD_UNT,
            BusCommand::Secondary(sad) => SECONDARY_BASE | (sad & ADDRESS_MASK),
            BusCommand::Other(byte) => byte,
        }
    }

    /// Symbolic name, for the commands reported to the host in device mode.
    pub const fn name(self) -> Option<&'static str> {
        match self {
            BusCommand::Gtl => Some("GPIB_CMD_GTL"),
            BusCommand::Sdc => Some("GPIB_CMD_SDC"),
            BusCommand::Get => Some("GPIB_CMD_GET"),
            BusCommand::Llo => Some("GPIB_CMD_LLO"),
            BusCommand::Dcl => Some("GPIB_CMD_DCL"),
            BusCommand::Spe => Some("GPIB_CMD_SPE"),
            BusCommand::Spd => Some("GPIB_CMD_SPD"),
            BusCommand::Unlisten => Some("GPIB_CMD_UNL"),
            BusCommand::Untalk => Some("GPIB_CMD_UNT"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_universal() {
        assert_eq!(BusCommand::from_byte(0x14), BusCommand::Dcl);
        assert_eq!(BusCommand::from_byte(0x18), BusCommand::Spe);
        assert_eq!(BusCommand::from_byte(0x19), BusCommand::Spd);
        assert_eq!(BusCommand::from_byte(0x3f), BusCommand::Unlisten);
        assert_eq!(BusCommand::from_byte(0x5f), BusCommand::Untalk);
        assert_eq!(BusCommand::from_byte(0x94), BusCommand::Dcl);
    }

    #[test]
    fn decode_address_groups() {
        assert_eq!(BusCommand::from_byte(0x20), BusCommand::Listen(0));
        assert_eq!(BusCommand::from_byte(0x2a), BusCommand::Listen(10));
        assert_eq!(BusCommand::from_byte(0x45), BusCommand::Talk(5));
        assert_eq!(BusCommand::from_byte(0x5e), BusCommand::Talk(30));
        assert_eq!(BusCommand::from_byte(0x61), BusCommand::Secondary(1));
        assert_eq!(BusCommand::from_byte(0x13), BusCommand::Other(0x13));
    }

    #[test]
    fn encode() {
        assert_eq!(BusCommand::Listen(7).to_byte(), 0x27);
        assert_eq!(BusCommand::Talk(0).to_byte(), 0x40);
        assert_eq!(BusCommand::Secondary(30).to_byte(), 0x7e);
        assert_eq!(BusCommand::Get.to_byte(), 0x08);
    }

    #[test]
    fn names() {
        assert_eq!(BusCommand::Gtl.name(), Some("GPIB_CMD_GTL"));
        assert_eq!(BusCommand::Listen(3).name(), None);
    }
}
