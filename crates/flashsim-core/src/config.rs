//! Protocol configuration types
//!
//! Both controllers are parameterized by an immutable configuration that is
//! validated before the controller is built. The defaults match the wire
//! contract of common 25-series flash chips.

use crate::error::{ConfigError, Result};
use crate::opcodes;

/// Widest supported command or address field, in bits.
///
/// Shift registers and addresses are `u32`, so wider fields cannot be
/// represented.
pub const MAX_FIELD_WIDTH: u32 = 32;

fn check_width(width: u32) -> Result<()> {
    if width > MAX_FIELD_WIDTH {
        return Err(ConfigError::WidthTooLarge { width }.into());
    }
    Ok(())
}

fn check_opcode(opcode: u32, command_width: u32) -> Result<()> {
    let bits = 32 - opcode.leading_zeros();
    if bits > command_width {
        return Err(ConfigError::OpcodeTooWide { opcode }.into());
    }
    Ok(())
}

/// Configuration for the single-data-rate, single-lane controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SdrConfig {
    /// Width of the command field in bits
    pub command_width: u32,
    /// Width of the address field in bits
    pub address_width: u32,
    /// Opcode of the read command
    pub read_opcode: u32,
}

impl Default for SdrConfig {
    fn default() -> Self {
        Self {
            command_width: 8,
            address_width: 24,
            read_opcode: opcodes::READ,
        }
    }
}

impl SdrConfig {
    /// Validate the configuration.
    ///
    /// Called by [`SdrController::new`](crate::sdr::SdrController::new);
    /// an invalid configuration refuses to build a controller.
    pub fn validate(&self) -> Result<()> {
        if self.command_width == 0 {
            return Err(ConfigError::ZeroCommandWidth.into());
        }
        if self.address_width == 0 {
            return Err(ConfigError::ZeroAddressWidth.into());
        }
        check_width(self.command_width)?;
        check_width(self.address_width)?;
        check_opcode(self.read_opcode, self.command_width)?;
        Ok(())
    }
}

/// Configuration for the double-data-rate, quad-lane controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DtrConfig {
    /// Width of the command field in bits
    pub command_width: u32,
    /// Width of the address field in bits; must be a multiple of 8 so the
    /// mode byte starts on a full-clock boundary
    pub address_width: u32,
    /// Opcode of the reset-enable command
    pub reset_enable_opcode: u32,
    /// Opcode of the reset command
    pub reset_opcode: u32,
    /// Opcode of the DTR read command
    pub read_opcode: u32,
    /// Dummy cycles between the mode byte and the first data nibble.
    /// The first dummy cycle overlaps the mode bits, so at least 2 are
    /// required.
    pub dummy_cycles: u32,
}

impl Default for DtrConfig {
    fn default() -> Self {
        Self {
            command_width: 8,
            address_width: 24,
            reset_enable_opcode: opcodes::RSTEN,
            reset_opcode: opcodes::RST,
            read_opcode: opcodes::FRQDTR,
            dummy_cycles: 15,
        }
    }
}

impl DtrConfig {
    /// Validate the configuration.
    ///
    /// Called by [`DtrController::new`](crate::dtr::DtrController::new);
    /// an invalid configuration refuses to build a controller.
    pub fn validate(&self) -> Result<()> {
        if self.command_width == 0 {
            return Err(ConfigError::ZeroCommandWidth.into());
        }
        if self.address_width == 0 {
            return Err(ConfigError::ZeroAddressWidth.into());
        }
        check_width(self.command_width)?;
        check_width(self.address_width)?;
        if self.address_width % 8 != 0 {
            return Err(ConfigError::AddressWidthNotByteAligned {
                width: self.address_width,
            }
            .into());
        }
        check_opcode(self.reset_enable_opcode, self.command_width)?;
        check_opcode(self.reset_opcode, self.command_width)?;
        check_opcode(self.read_opcode, self.command_width)?;
        if self.dummy_cycles <= 1 {
            return Err(ConfigError::TooFewDummyCycles.into());
        }
        Ok(())
    }
}
