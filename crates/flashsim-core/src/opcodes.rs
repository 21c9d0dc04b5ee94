//! Standard JEDEC SPI flash opcodes used by the read controllers

/// Read Data (plain SPI, up to ~33 MHz)
pub const READ: u32 = 0x03;
/// Reset Enable - must precede RST
pub const RSTEN: u32 = 0x66;
/// Reset - returns the chip to its power-on state
pub const RST: u32 = 0x99;
/// Fast Read Quad I/O DTR
pub const FRQDTR: u32 = 0xED;
