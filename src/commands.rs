//! This module implements the `++` configuration commands sent by the host.
//!
//! A command record is parsed into a [`Command`] first, then executed
//! against the [`ProtocolHandler`].  Parsing doesn't look at the adapter's
//! state, so a command which is only valid in one role parses in either,
//! and is treated as unrecognized when executed in the other.
//!
//! Arguments are decimal numbers separated by spaces.  As with C's `atoi`
//! a number is the leading digits of a token, so `5x` is 5.  A flag is on
//! if its argument is a number greater than 0.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use heapless::Vec;

use crate::config::{Config, ConfigStore};
use crate::constants::{
    HELP_URL, MAX_PAD, MAX_TIMEOUT_MS, MAX_TRIGGER_ADDRESSES, MIN_PAD, SAD_USER_OFFSET,
    VERSION_MAJOR, VERSION_MINOR_A, VERSION_MINOR_B,
};
use crate::link::{LinkWriter, eot_write};
use crate::protocol::{
    Address, BusCommand, Direction, EosMode, GpibBus, Lines, LoopOutcome, ProtocolHandler,
    ReadMode, Role,
};
use crate::util::time::Clock;

/// Query or change a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Setting<T> {
    /// No argument - print the current value.
    Query,

    /// Change to this value.
    Set(T),

    /// An argument which isn't valid for the setting.  Nothing happens.
    Ignore,
}

/// Addresses to trigger.
pub type TriggerList = Vec<Address, MAX_TRIGGER_ADDRESSES>;

/// A parsed `++` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Addr(Setting<Address>),
    Auto(Setting<bool>),
    Clr,
    Debug(Setting<bool>),
    Eoi(Setting<bool>),
    Eos(Setting<EosMode>),
    EotChar(Setting<u8>),
    EotEnable(Setting<bool>),
    Help,
    Ifc,
    Llo,
    Loc,
    Lon(Setting<bool>),
    Mode(Setting<Role>),
    /// `None` if the argument wasn't understood.
    Read(Option<ReadMode>),
    ReadTmoMs(Setting<u16>),
    Rst,
    SaveCfg(Setting<bool>),
    /// `Query` polls the configured device.
    Spoll(Setting<Address>),
    Srq,
    Status(Setting<u8>),
    /// `Query` triggers the configured device.
    Trg(Setting<TriggerList>),
    Ver,
}

impl Command {
    /// Parses the payload of a command record, including its leading `++`.
    /// Returns `None` if the command isn't recognized.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let line = payload.strip_prefix(b"++").unwrap_or(payload);
        let line = trim_right(line);

        let (name, args) = match line.iter().position(|&b| b == b' ') {
            Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
            None => (line, None),
        };

        let command = match name {
            b"addr" => Command::Addr(setting(args, |a| AddressList::new(a).next())),
            b"auto" => Command::Auto(flag(args)),
            b"clr" => Command::Clr,
            b"debug" => Command::Debug(flag(args)),
            b"eoi" => Command::Eoi(flag(args)),
            b"eos" => Command::Eos(setting(args, |a| {
                number(a).and_then(|n| u8::try_from(n).ok()).and_then(EosMode::from_u8)
            })),
            b"eot_char" => Command::EotChar(setting(args, |a| {
                number(a).and_then(|n| u8::try_from(n).ok())
            })),
            b"eot_enable" => Command::EotEnable(flag(args)),
            b"help" => Command::Help,
            b"ifc" => Command::Ifc,
            b"llo" => Command::Llo,
            b"loc" => Command::Loc,
            b"lon" => Command::Lon(flag(args)),
            b"mode" => Command::Mode(setting(args, |a| {
                number(a).and_then(|n| u8::try_from(n).ok()).and_then(Role::from_u8)
            })),
            b"read" => Command::Read(match args {
                None => Some(ReadMode::UntilTimeout),
                Some(a) => read_mode(a),
            }),
            b"read_tmo_ms" => Command::ReadTmoMs(setting(args, |a| {
                number(a)
                    .and_then(|n| u16::try_from(n).ok())
                    .filter(|&n| n <= MAX_TIMEOUT_MS)
            })),
            b"rst" => Command::Rst,
            b"savecfg" => Command::SaveCfg(flag(args)),
            b"spoll" => Command::Spoll(setting(args, |a| AddressList::new(a).next())),
            b"srq" => Command::Srq,
            b"status" => Command::Status(setting(args, |a| {
                number(a).and_then(|n| u8::try_from(n).ok())
            })),
            b"trg" => Command::Trg(match args {
                None => Setting::Query,
                Some(a) => Setting::Set(AddressList::new(a).take(MAX_TRIGGER_ADDRESSES).collect()),
            }),
            b"ver" => Command::Ver,
            _ => return None,
        };

        Some(command)
    }

    /// Only valid in the controller role.
    pub fn controller_only(&self) -> bool {
        matches!(
            self,
            Command::Auto(_)
                | Command::Clr
                | Command::Ifc
                | Command::Llo
                | Command::Loc
                | Command::Read(_)
                | Command::Spoll(_)
                | Command::Srq
                | Command::Trg(_)
        )
    }

    /// Only valid in the device role.
    pub fn device_only(&self) -> bool {
        matches!(self, Command::Lon(_) | Command::Status(_))
    }
}

fn trim_right(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |pos| pos + 1);
    &line[..end]
}

// Splits off the next space separated token, skipping leading spaces.
fn next_token(s: &[u8]) -> (&[u8], &[u8]) {
    let start = s.iter().position(|&b| b != b' ').unwrap_or(s.len());
    let s = &s[start..];
    match s.iter().position(|&b| b == b' ') {
        Some(end) => (&s[..end], &s[end..]),
        None => (s, &s[s.len()..]),
    }
}

/// The leading decimal digits of the first token, if there are any.
fn number(s: &[u8]) -> Option<u32> {
    let (token, _) = next_token(s);
    let digits = token.iter().take_while(|b| b.is_ascii_digit());
    let mut value: Option<u32> = None;
    for &d in digits {
        let acc = value.unwrap_or(0);
        value = Some(acc.saturating_mul(10).saturating_add((d - b'0') as u32));
    }
    value
}

fn setting<T>(args: Option<&[u8]>, parse: impl FnOnce(&[u8]) -> Option<T>) -> Setting<T> {
    match args {
        None => Setting::Query,
        Some(a) => parse(a).map_or(Setting::Ignore, Setting::Set),
    }
}

fn flag(args: Option<&[u8]>) -> Setting<bool> {
    setting(args, |a| Some(number(a).unwrap_or(0) > 0))
}

fn read_mode(args: &[u8]) -> Option<ReadMode> {
    if args.starts_with(b"eoi") {
        return Some(ReadMode::UntilEoi);
    }
    let c = number(args).unwrap_or(0);
    u8::try_from(c).ok().map(ReadMode::UntilChar)
}

/// Parses a list of addresses: a PAD of 1-30, optionally followed by a SAD
/// typed as 96-126.  Stops at the first token which doesn't fit, keeping the
/// PAD before it if there was one.
struct AddressList<'a> {
    rest: &'a [u8],
    done: bool,
}

impl<'a> AddressList<'a> {
    fn new(args: &'a [u8]) -> Self {
        Self {
            rest: args,
            done: false,
        }
    }
}

impl Iterator for AddressList<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        if self.done {
            return None;
        }

        let (token, after_pad) = next_token(self.rest);
        let pad = match number(token).and_then(|n| u8::try_from(n).ok()) {
            Some(pad) if (MIN_PAD..=MAX_PAD).contains(&pad) => pad,
            _ => {
                self.done = true;
                return None;
            }
        };

        let (token, after_sad) = next_token(after_pad);
        match number(token) {
            // Another PAD follows.
            Some(n) if (MIN_PAD as u32..=MAX_PAD as u32).contains(&n) => {
                self.rest = after_pad;
                Some(Address::primary(pad))
            }
            Some(n) if (0x60..=0x7e).contains(&n) => {
                self.rest = after_sad;
                Some(Address::new(pad, Some(n as u8 - SAD_USER_OFFSET)))
            }
            _ => {
                self.done = true;
                Some(Address::primary(pad))
            }
        }
    }
}

impl<B: GpibBus, C: Clock> ProtocolHandler<B, C> {
    /// Executes a parsed command.
    pub(crate) fn execute<S, L>(
        &mut self,
        command: Command,
        cfg: &mut Config,
        store: &mut S,
        link: &mut L,
    ) -> LoopOutcome
    where
        S: ConfigStore + ?Sized,
        L: LinkWriter + ?Sized,
    {
        if (command.controller_only() && !cfg.mode.is_controller())
            || (command.device_only() && cfg.mode.is_controller())
        {
            debug!("Command not valid as {:?}", cfg.mode);
            Self::report_text(cfg, link, "Unrecognized command.");
            return LoopOutcome::Continue;
        }

        let eot = cfg.eot();
        match command {
            Command::Addr(setting) => match setting {
                Setting::Query => {
                    let addr = cfg.address();
                    match addr.user_sad() {
                        Some(sad) => eot_write(link, eot, format_args!("{} {}", addr.pad, sad)),
                        None => eot_write(link, eot, format_args!("{}", addr.pad)),
                    }
                }
                Setting::Set(addr) => {
                    cfg.set_address(addr);
                    cfg.changed(store);
                }
                Setting::Ignore => {}
            },

            Command::Auto(setting) => {
                Self::apply(cfg, store, link, setting, |c| &mut c.auto_read, |v| v as u32)
            }
            Command::Eoi(setting) => {
                Self::apply(cfg, store, link, setting, |c| &mut c.use_eoi, |v| v as u32)
            }
            Command::Eos(setting) => {
                Self::apply(cfg, store, link, setting, |c| &mut c.eos, |v| v.as_u8() as u32)
            }
            Command::EotEnable(setting) => {
                Self::apply(cfg, store, link, setting, |c| &mut c.eot_enable, |v| v as u32)
            }
            Command::EotChar(setting) => {
                Self::apply(cfg, store, link, setting, |c| &mut c.eot_char, |v| v as u32)
            }
            Command::ReadTmoMs(setting) => {
                Self::apply(cfg, store, link, setting, |c| &mut c.timeout_ms, |v| v as u32)
            }

            // Not persisted.
            Command::Debug(setting) => match setting {
                Setting::Query => eot_write(link, eot, format_args!("{}", cfg.debug as u8)),
                Setting::Set(on) => cfg.debug = on,
                Setting::Ignore => {}
            },
            Command::Lon(setting) => match setting {
                Setting::Query => eot_write(link, eot, format_args!("{}", cfg.listen_only as u8)),
                Setting::Set(on) => cfg.listen_only = on,
                Setting::Ignore => {}
            },

            Command::SaveCfg(setting) => match setting {
                Setting::Query => eot_write(link, eot, format_args!("{}", cfg.save_cfg as u8)),
                Setting::Set(on) => {
                    cfg.save_cfg = on;
                    if on {
                        cfg.save(store);
                    }
                }
                Setting::Ignore => {}
            },

            Command::Mode(setting) => match setting {
                Setting::Query => eot_write(link, eot, format_args!("{}", cfg.mode.as_u8())),
                Setting::Set(role) => self.change_role(cfg, store, role),
                Setting::Ignore => {}
            },

            Command::Clr => {
                let result = self
                    .driver
                    .send_addressed_command(cfg, cfg.address(), BusCommand::Sdc);
                Self::report(cfg, link, result);
            }
            Command::Llo => {
                let result = self
                    .driver
                    .send_addressed_command(cfg, cfg.address(), BusCommand::Llo);
                Self::report(cfg, link, result);
            }
            Command::Loc => {
                let result = self
                    .driver
                    .send_addressed_command(cfg, cfg.address(), BusCommand::Gtl);
                Self::report(cfg, link, result);
            }
            Command::Ifc => {
                let result = self.driver.send_interface_clear(cfg);
                Self::report(cfg, link, result);
            }

            Command::Read(Some(mode)) => {
                match self.driver.addressing_setup(cfg, cfg.address(), Direction::In) {
                    Ok(()) => {
                        self.driver.receive_message(cfg, mode, link);
                    }
                    Err(e) => Self::report::<L, ()>(cfg, link, Err(e)),
                }
            }
            Command::Read(None) => {}

            Command::Spoll(setting) => {
                let addr = match setting {
                    Setting::Query => cfg.address(),
                    Setting::Set(addr) => addr,
                    Setting::Ignore => return LoopOutcome::Continue,
                };
                match self.driver.read_status_byte(cfg, addr) {
                    // The raw byte, with no EOT.
                    Ok(status) => link.write_byte(status),
                    Err(e) => Self::report::<L, ()>(cfg, link, Err(e)),
                }
            }

            Command::Srq => {
                let srq = self.driver.is_asserted(Lines::SRQ);
                eot_write(link, eot, format_args!("{}", srq as u8));
            }

            Command::Status(setting) => match setting {
                Setting::Query => {
                    eot_write(link, eot, format_args!("{}", self.device.status_byte))
                }
                Setting::Set(status) => self.driver.set_status_byte(&mut self.device, status),
                Setting::Ignore => {}
            },

            Command::Trg(setting) => match setting {
                Setting::Query => {
                    let result = self
                        .driver
                        .send_addressed_command(cfg, cfg.address(), BusCommand::Get);
                    Self::report(cfg, link, result);
                }
                Setting::Set(addrs) => {
                    let report = self.driver.send_group_trigger(cfg, &addrs);
                    debug!("Triggered {} of {} devices", report.triggered, addrs.len());
                    Self::report(cfg, link, report.result());
                }
                Setting::Ignore => {}
            },

            Command::Rst => {
                info!("Reset requested by host");
                return LoopOutcome::Reset;
            }

            Command::Ver => eot_write(
                link,
                eot,
                format_args!(
                    "GPIB-USB Version {}.{}{}",
                    VERSION_MAJOR, VERSION_MINOR_A, VERSION_MINOR_B
                ),
            ),
            Command::Help => eot_write(link, eot, format_args!("Documentation: {}", HELP_URL)),
        }

        LoopOutcome::Continue
    }

    // Queries or sets a persisted config field.
    fn apply<S, L, T>(
        cfg: &mut Config,
        store: &mut S,
        link: &mut L,
        setting: Setting<T>,
        field: impl Fn(&mut Config) -> &mut T,
        display: impl Fn(T) -> u32,
    ) where
        S: ConfigStore + ?Sized,
        L: LinkWriter + ?Sized,
        T: Copy,
    {
        match setting {
            Setting::Query => {
                let value = display(*field(cfg));
                eot_write(link, cfg.eot(), format_args!("{}", value));
            }
            Setting::Set(value) => {
                *field(cfg) = value;
                cfg.changed(store);
            }
            Setting::Ignore => {}
        }
    }
}
