//! Error types for flashsim-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Details about an invalid protocol configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Command width is zero
    ZeroCommandWidth,
    /// Address width is zero
    ZeroAddressWidth,
    /// Command or address width exceeds 32 bits (the shift registers are `u32`)
    WidthTooLarge {
        /// The offending width in bits
        width: u32,
    },
    /// An opcode does not fit in the configured command width
    OpcodeTooWide {
        /// The offending opcode value
        opcode: u32,
    },
    /// DTR address width is not a multiple of 8 bits
    AddressWidthNotByteAligned {
        /// The offending width in bits
        width: u32,
    },
    /// DTR dummy-cycle count is 1 or less (the first dummy cycle overlaps
    /// the mode bits, so at least 2 are required)
    TooFewDummyCycles,
    /// Reader buffer capacity is zero
    ZeroBufferCapacity,
    /// DTR reader buffer capacity is not a power of two (the cursor-wrap
    /// completion check requires it)
    BufferNotPowerOfTwo,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Protocol configuration rejected at construction
    InvalidConfig(ConfigError),
    /// "Read done" failed to deassert after "read" was dropped
    Timeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCommandWidth => write!(f, "command width must be greater than zero"),
            Self::ZeroAddressWidth => write!(f, "address width must be greater than zero"),
            Self::WidthTooLarge { width } => {
                write!(f, "width of {} bits exceeds the 32-bit limit", width)
            }
            Self::OpcodeTooWide { opcode } => {
                write!(f, "opcode 0x{:X} does not fit in the command width", opcode)
            }
            Self::AddressWidthNotByteAligned { width } => {
                write!(f, "address width of {} bits is not a multiple of 8", width)
            }
            Self::TooFewDummyCycles => write!(f, "at least 2 dummy cycles are required"),
            Self::ZeroBufferCapacity => write!(f, "buffer capacity must be greater than zero"),
            Self::BufferNotPowerOfTwo => write!(f, "buffer capacity must be a power of two"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(detail) => write!(f, "invalid configuration: {}", detail),
            Self::Timeout => write!(f, "timeout waiting for read-done deassertion"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(detail: ConfigError) -> Self {
        Self::InvalidConfig(detail)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
