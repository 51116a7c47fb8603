//! This file defines the errors returned by the GPIB protocol driver.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use thiserror::Error;

/// All errors are recoverable.  By the time one is returned the bus lines
/// the operation was driving have been put back into a released state, and
/// the main loop simply carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// A handshake wait exceeded the configured timeout
    #[error("Timeout: handshake did not complete")]
    HandshakeTimeout,

    /// NRFD and NDAC were both released at the start of a byte - there is no
    /// acceptor on the bus
    #[error("Error: NRFD and NDAC lines both high")]
    BusContention,

    /// The operation isn't valid in the adapter's current role
    #[error("Error: operation not valid in current mode")]
    RoleViolation,

    /// PAD or SAD out of range
    #[error("Error: device address out of range")]
    InvalidAddress,
}

pub type Result<T> = core::result::Result<T, DriverError>;
