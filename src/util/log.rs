//! Logging macros used throughout pico488.
//!
//! On target the firmware logs with defmt over RTT.  When built without the
//! `defmt` feature (host builds and unit tests) the same macros forward to
//! the `log` facade instead, so the protocol code can be exercised off
//! target with `RUST_LOG` controlling the output.  defmt wins if both are
//! enabled, and with neither the arguments are checked but nothing is
//! logged.
//!
//! Keep arguments to primitives, `&str` and types which implement both
//! `Debug` and `defmt::Format`, and stick to `{}`, `{:?}` and `{:02x}` style
//! placeholders, which both backends understand.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::trace!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)*);
    }};
}
pub(crate) use trace;

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::debug!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)*);
    }};
}
pub(crate) use debug;

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::info!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::info!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)*);
    }};
}
pub(crate) use info;

macro_rules! warn_ {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::warn!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)*);
    }};
}
pub(crate) use warn_ as warn;

macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::error!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::error!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)*);
    }};
}
pub(crate) use error;
