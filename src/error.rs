//! Error types for the management core.
//!
//! Errors are grouped into categories: codec errors (wire format),
//! connection errors (point-to-point session state), transport errors
//! (the underlying tunnel) and addressing errors. Category structs carry
//! a backtrace when the `std` feature is enabled.

use core::fmt;

#[cfg(feature = "std")]
use std::backtrace::Backtrace;

/// Result type alias for all operations in this crate.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Codec error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum CodecErrorKind {
    /// Input ended before the structure was complete.
    ShortInput,
    /// A declared length field does not match the recomputed size.
    InvalidLength,
    /// The output buffer cannot hold the packed structure.
    BufferTooSmall,
    /// A variable-length structure exceeds the fixed capacity of its
    /// backing storage.
    CapacityExceeded,
    /// An unrecognized cEMI message code.
    UnknownMessageCode,
    /// A string field that is not valid UTF-8.
    InvalidString,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ConnectionErrorKind {
    NotConnected,
    AlreadyConnected,
    ResponseTimeout,
    AckMismatch,
    Closed,
    NotFound,
    PoolExhausted,
    UnexpectedPayload,
}

/// Transport error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum TransportErrorKind {
    TunnelClosed,
    SendFailed,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum AddressingErrorKind {
    InvalidFormat,
    OutOfRange,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// Error type returned by all operations in this crate.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxError {
    /// Wire-format errors (truncated or inconsistent PDUs, DIBs, SRPs)
    Codec(CodecError),
    /// Point-to-point session errors (state, sequencing, timeouts)
    Connection(ConnectionError),
    /// Errors originating in the underlying tunnel
    Transport(TransportError),
    /// Invalid KNX addresses
    Addressing(AddressingError),
}

/// Codec error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecError {
    kind: CodecErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl CodecError {
    pub(crate) fn new(kind: CodecErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }
}

/// Connection error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ConnectionError {
    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }
}

/// Transport error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError {
    kind: TransportErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl TransportError {
    pub(crate) fn new(kind: TransportErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }
}

/// Addressing error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressingError {
    kind: AddressingErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl AddressingError {
    pub(crate) fn new(kind: AddressingErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }
}

// =============================================================================
// Convenience Constructors
// =============================================================================

impl KnxError {
    // Codec errors
    pub(crate) fn short_input() -> Self {
        Self::Codec(CodecError::new(CodecErrorKind::ShortInput))
    }

    pub(crate) fn invalid_length() -> Self {
        Self::Codec(CodecError::new(CodecErrorKind::InvalidLength))
    }

    pub(crate) fn buffer_too_small() -> Self {
        Self::Codec(CodecError::new(CodecErrorKind::BufferTooSmall))
    }

    pub(crate) fn capacity_exceeded() -> Self {
        Self::Codec(CodecError::new(CodecErrorKind::CapacityExceeded))
    }

    pub(crate) fn unknown_message_code() -> Self {
        Self::Codec(CodecError::new(CodecErrorKind::UnknownMessageCode))
    }

    pub(crate) fn invalid_string() -> Self {
        Self::Codec(CodecError::new(CodecErrorKind::InvalidString))
    }

    // Connection errors
    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn already_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AlreadyConnected))
    }

    pub(crate) fn response_timeout() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::ResponseTimeout))
    }

    pub(crate) fn ack_mismatch() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AckMismatch))
    }

    pub(crate) fn connection_closed() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Closed))
    }

    pub(crate) fn connection_not_found() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotFound))
    }

    pub(crate) fn pool_exhausted() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::PoolExhausted))
    }

    pub(crate) fn unexpected_payload() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::UnexpectedPayload))
    }

    // Transport errors
    pub(crate) fn tunnel_closed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::TunnelClosed))
    }

    pub(crate) fn send_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::SendFailed))
    }

    // Addressing errors
    pub(crate) fn invalid_address() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidFormat))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }
}

// =============================================================================
// Predicates
// =============================================================================

impl KnxError {
    /// Input was truncated.
    pub fn is_short_input(&self) -> bool {
        matches!(self, Self::Codec(e) if e.kind == CodecErrorKind::ShortInput)
    }

    /// A declared length field was inconsistent with the structure.
    pub fn is_invalid_length(&self) -> bool {
        matches!(self, Self::Codec(e) if e.kind == CodecErrorKind::InvalidLength)
    }

    /// The pack target buffer was undersized.
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self, Self::Codec(e) if e.kind == CodecErrorKind::BufferTooSmall)
    }

    /// The operation required an established connection.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Connection(e) if e.kind == ConnectionErrorKind::NotConnected)
    }

    /// No matching response arrived before the deadline.
    pub fn is_response_timeout(&self) -> bool {
        matches!(self, Self::Connection(e) if e.kind == ConnectionErrorKind::ResponseTimeout)
    }

    /// An acknowledgement carried the wrong sequence number.
    pub fn is_ack_mismatch(&self) -> bool {
        matches!(self, Self::Connection(e) if e.kind == ConnectionErrorKind::AckMismatch)
    }

    /// The connection was closed while the operation was blocked.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::Connection(e) if e.kind == ConnectionErrorKind::Closed)
    }

    /// No registry entry exists for the requested address.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Connection(e) if e.kind == ConnectionErrorKind::NotFound)
    }

    /// The underlying tunnel shut down.
    pub fn is_tunnel_closed(&self) -> bool {
        matches!(self, Self::Transport(e) if e.kind == TransportErrorKind::TunnelClosed)
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Codec(e) => write!(f, "Codec error: {:?}", e.kind),
            KnxError::Connection(e) => write!(f, "Connection error: {:?}", e.kind),
            KnxError::Transport(e) => write!(f, "Transport error: {:?}", e.kind),
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KnxError {}
