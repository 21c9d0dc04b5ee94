//! Wire-level bus types and the bus-peer seam
//!
//! Controllers expose their registered outputs as plain snapshot structs; an
//! external device (the real chip, or a test double) is attached behind the
//! [`SdrBusDevice`] / [`QuadBusDevice`] traits and observes those snapshots
//! once per driving-clock edge.
//!
//! # Timing contract
//!
//! `edge` is called with the controller's *pre-edge* outputs (the values the
//! wires carried before the current driving-clock edge), and the line levels
//! it returns are sampled by the controller on the *next* edge. This is the
//! register-transfer ordering of the original hardware: a peer reacting to
//! an edge cannot influence that same edge.

use bitflags::bitflags;

bitflags! {
    /// Output-enable vector for the four data lanes.
    ///
    /// A set bit means the controller drives that lane; a clear bit leaves
    /// the lane high-Z so the peer may drive it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Lanes: u8 {
        /// IO0 (COPI in single-lane mode)
        const IO0 = 1 << 0;
        /// IO1 (CIPO in single-lane mode)
        const IO1 = 1 << 1;
        /// IO2 (WP# when not in quad mode)
        const IO2 = 1 << 2;
        /// IO3 (HOLD#/RESET# when not in quad mode)
        const IO3 = 1 << 3;
    }
}

impl Default for Lanes {
    fn default() -> Self {
        Lanes::empty()
    }
}

/// Registered outputs of the SDR controller, snapshotted once per edge.
#[derive(Debug, Clone, Copy)]
pub struct SdrWires {
    /// Chip-select, active low
    pub cs_n: bool,
    /// Protocol clock
    pub sclk: bool,
    /// Controller-out/peripheral-in data line
    pub copi: bool,
    /// One-edge pulse marking a completed byte on `data`
    pub data_valid: bool,
    /// Low 8 bits of the shift register
    pub data: u8,
}

/// Registered outputs of the DTR controller, snapshotted once per edge.
#[derive(Debug, Clone, Copy)]
pub struct QuadWires {
    /// Chip-select, active low
    pub cs_n: bool,
    /// Protocol clock
    pub sclk: bool,
    /// Driven levels of the four data lanes (low 4 bits)
    pub io_out: u8,
    /// Which lanes the controller is driving
    pub oe: Lanes,
    /// Most recently assembled data byte
    pub data: u8,
    /// One-edge pulse marking the end of the configure sequence
    pub configure_done: bool,
}

/// A device on the single-lane bus.
pub trait SdrBusDevice {
    /// React to one driving-clock edge and return the level driven onto the
    /// CIPO line for the next edge.
    fn edge(&mut self, wires: &SdrWires) -> bool;
}

/// A device on the quad-lane bus.
pub trait QuadBusDevice {
    /// React to one driving-clock edge and return the nibble driven onto the
    /// lanes the controller has released (low 4 bits) for the next edge.
    fn edge(&mut self, wires: &QuadWires) -> u8;
}

impl<T: SdrBusDevice + ?Sized> SdrBusDevice for &mut T {
    fn edge(&mut self, wires: &SdrWires) -> bool {
        (**self).edge(wires)
    }
}

impl<T: QuadBusDevice + ?Sized> QuadBusDevice for &mut T {
    fn edge(&mut self, wires: &QuadWires) -> u8 {
        (**self).edge(wires)
    }
}
