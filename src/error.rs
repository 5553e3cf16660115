//! Error types for the HFP core.
//!
//! Library-internal failures are represented as [`HfpError`] variants so
//! callers can match on the exact failure kind; the demo binary collapses
//! everything into `anyhow::Result` at the boundary.

use thiserror::Error;

use crate::address::DeviceAddress;

/// Failure kinds produced by the HFP core (see design note §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HfpError {
    /// The line buffer's header prefix matched no entry in the command table.
    #[error("unrecognized AT command header: {0:?}")]
    UnknownCommand(String),

    /// A token was present where the active command's grammar did not expect one,
    /// or a numeric token failed to parse as an integer.
    #[error("malformed argument for command {command:?}: {token:?}")]
    MalformedArgument { command: String, token: String },

    /// `+COPS=` supplied a format other than `3`, the only one this profile supports.
    #[error("unsupported operator selection format: {0}")]
    UnsupportedOperatorFormat(u8),

    /// A lookup in the connection registry found no session for the given key.
    #[error("no session for address {0}")]
    SessionNotFound(DeviceAddress),

    /// The session pool has no room for another peer.
    #[error("session pool exhausted")]
    PoolExhausted,

    /// A lifecycle operation was requested from a state that does not permit it.
    #[error("invalid transition: {operation} from state {state}")]
    InvalidTransition { operation: &'static str, state: &'static str },

    /// Insertion would violate a registry uniqueness invariant (duplicate address,
    /// rfcomm_cid, or con_handle across live sessions).
    #[error("registry conflict: {0}")]
    RegistryConflict(&'static str),
}

pub type Result<T> = std::result::Result<T, HfpError>;
