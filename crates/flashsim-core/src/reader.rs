//! Buffering read-request wrappers
//!
//! A reader owns a controller, the bus-peer device, and a fixed-capacity
//! byte buffer, and turns "read N bytes starting at address A" into the
//! controller's bit-level transfers. Each [`tick`](SdrReader::tick) advances
//! the whole assembly by one driving-clock edge with the register-transfer
//! ordering of the original hardware: wrapper and controller each observe
//! the other's pre-edge outputs, and the device's drive is sampled on the
//! edge after it reacts.
//!
//! The host-facing shape (read-enable, address, read-done, per-index buffer
//! byte) is the [`ReadPort`] trait; [`read_into`] runs the polling protocol
//! over it, including the 5-edge bound on read-done deassertion.
//!
//! A reader guarantees exactly one read in flight. Issuing a second read
//! before completion is a caller contract violation with undefined captured
//! contents; it is documented, not defended against.

use crate::bus::{QuadBusDevice, SdrBusDevice};
use crate::config::{DtrConfig, SdrConfig};
use crate::dtr::{DtrController, DtrInputs};
use crate::error::{ConfigError, Error, Result};
use crate::sdr::{SdrController, SdrInputs};

/// Edges allowed for "read done" to deassert after "read" is dropped before
/// the operation fails with [`Error::Timeout`].
pub const READ_DONE_TIMEOUT: u32 = 5;

/// Host-facing register contract of a reader.
///
/// This is the shape the external register/bus shim exposes: single-bit
/// read-enable, an address register, a read-done bit and a per-index buffer
/// byte, pollable at arbitrary latency. [`step`](Self::step) advances the
/// underlying assembly by one driving-clock edge.
pub trait ReadPort {
    /// Set the read-enable bit.
    fn set_read(&mut self, on: bool);
    /// Set the address register.
    fn set_address(&mut self, address: u32);
    /// Current state of the read-done bit.
    fn read_done(&self) -> bool;
    /// Byte at `index` in the capture buffer. Defined only after a
    /// completed read.
    fn buffered_byte(&self, index: usize) -> u8;
    /// Capacity of the capture buffer in bytes.
    fn capacity(&self) -> usize;
    /// Advance one driving-clock edge.
    fn step(&mut self);
}

/// Drive a read over a [`ReadPort`].
///
/// Transfers the full buffer, then copies `min(out.len(), capacity)` bytes
/// into `out` and returns that count. Fails with [`Error::Timeout`] if
/// "read done" does not deassert within [`READ_DONE_TIMEOUT`] edges of
/// "read" being dropped.
pub fn read_into<P: ReadPort + ?Sized>(
    port: &mut P,
    address: u32,
    out: &mut [u8],
) -> Result<usize> {
    debug_assert!(!port.read_done(), "previous read still completing");

    log::debug!("read 0x{:06X}, {} byte buffer", address, port.capacity());

    port.set_address(address);
    port.set_read(true);
    while !port.read_done() {
        port.step();
    }
    port.set_read(false);

    let mut cleared = false;
    for _ in 0..READ_DONE_TIMEOUT {
        if !port.read_done() {
            cleared = true;
            break;
        }
        port.step();
    }
    if !cleared {
        log::warn!("read-done stuck after read deassertion");
        return Err(Error::Timeout);
    }

    let len = out.len().min(port.capacity());
    for (i, byte) in out[..len].iter_mut().enumerate() {
        *byte = port.buffered_byte(i);
    }
    Ok(len)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SdrWrapperPhase {
    Idle,
    Transfer,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DtrWrapperPhase {
    Idle,
    ConfigureWait,
    TransferWait,
    Transfer,
    Done,
}

/// Buffering reader for the SDR controller.
///
/// Captures one byte per `data_valid` pulse into the buffer, asserts
/// "read done" one edge after the last byte, and holds it until the host
/// deasserts "read".
#[derive(Debug)]
pub struct SdrReader<D, const N: usize> {
    ctrl: SdrController,
    dev: D,
    cipo: bool,
    host_read: bool,
    host_address: u32,
    ctrl_read: bool,
    ctrl_address: u32,
    wr_addr: usize,
    read_done: bool,
    buf: [u8; N],
    phase: SdrWrapperPhase,
}

impl<D: SdrBusDevice, const N: usize> SdrReader<D, N> {
    /// Build a reader around a controller configuration and a bus peer.
    pub fn new(cfg: SdrConfig, dev: D) -> Result<Self> {
        if N == 0 {
            return Err(ConfigError::ZeroBufferCapacity.into());
        }
        Ok(Self {
            ctrl: SdrController::new(cfg)?,
            dev,
            cipo: false,
            host_read: false,
            host_address: 0,
            ctrl_read: false,
            ctrl_address: 0,
            wr_addr: 0,
            read_done: false,
            buf: [0; N],
            phase: SdrWrapperPhase::Idle,
        })
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &SdrController {
        &self.ctrl
    }

    /// The attached bus peer.
    pub fn device(&self) -> &D {
        &self.dev
    }

    /// The attached bus peer, mutably (for inspecting test doubles).
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Advance the assembly by one driving-clock edge.
    pub fn tick(&mut self) {
        let wires = self.ctrl.wires();
        self.ctrl.tick(&SdrInputs {
            read: self.ctrl_read,
            address: self.ctrl_address,
            cipo: self.cipo,
        });

        match self.phase {
            SdrWrapperPhase::Idle => {
                if self.host_read {
                    self.ctrl_read = true;
                    self.ctrl_address = self.host_address;
                    self.wr_addr = 0;
                    self.phase = SdrWrapperPhase::Transfer;
                }
            }
            SdrWrapperPhase::Transfer => {
                if wires.data_valid {
                    self.buf[self.wr_addr] = wires.data;
                    if self.wr_addr == N - 1 {
                        self.ctrl_read = false;
                        self.read_done = true;
                        self.phase = SdrWrapperPhase::Done;
                    } else {
                        self.wr_addr += 1;
                    }
                }
            }
            SdrWrapperPhase::Done => {
                if !self.host_read {
                    self.read_done = false;
                    self.phase = SdrWrapperPhase::Idle;
                }
            }
        }

        self.cipo = self.dev.edge(&wires);
    }
}

impl<D: SdrBusDevice, const N: usize> ReadPort for SdrReader<D, N> {
    fn set_read(&mut self, on: bool) {
        self.host_read = on;
    }

    fn set_address(&mut self, address: u32) {
        self.host_address = address;
    }

    fn read_done(&self) -> bool {
        self.read_done
    }

    fn buffered_byte(&self, index: usize) -> u8 {
        self.buf[index]
    }

    fn capacity(&self) -> usize {
        N
    }

    fn step(&mut self) {
        self.tick();
    }
}

/// Buffering reader for the DTR controller.
///
/// Runs the configure sequence before every read, then counts the
/// controller's published startup latency and captures one byte per full
/// protocol clock; the controller has no per-byte strobe. The buffer
/// capacity `N` must be a power of two.
#[derive(Debug)]
pub struct DtrReader<D, const N: usize> {
    ctrl: DtrController,
    dev: D,
    io_in: u8,
    host_read: bool,
    host_address: u32,
    ctrl_configure: bool,
    ctrl_read: bool,
    ctrl_address: u32,
    wr_addr: usize,
    read_done: bool,
    wait_cycles: u32,
    new_byte: bool,
    buf: [u8; N],
    phase: DtrWrapperPhase,
}

impl<D: QuadBusDevice, const N: usize> DtrReader<D, N> {
    /// Build a reader around a controller configuration and a bus peer.
    pub fn new(cfg: DtrConfig, dev: D) -> Result<Self> {
        if !N.is_power_of_two() {
            return Err(ConfigError::BufferNotPowerOfTwo.into());
        }
        Ok(Self {
            ctrl: DtrController::new(cfg)?,
            dev,
            io_in: 0,
            host_read: false,
            host_address: 0,
            ctrl_configure: false,
            ctrl_read: false,
            ctrl_address: 0,
            wr_addr: 0,
            read_done: false,
            wait_cycles: 0,
            new_byte: false,
            buf: [0; N],
            phase: DtrWrapperPhase::Idle,
        })
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &DtrController {
        &self.ctrl
    }

    /// The attached bus peer.
    pub fn device(&self) -> &D {
        &self.dev
    }

    /// The attached bus peer, mutably (for inspecting test doubles).
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Advance the assembly by one driving-clock edge.
    pub fn tick(&mut self) {
        let wires = self.ctrl.wires();
        self.ctrl.tick(&DtrInputs {
            configure: self.ctrl_configure,
            read: self.ctrl_read,
            address: self.ctrl_address,
            io_in: self.io_in,
        });

        match self.phase {
            DtrWrapperPhase::Idle => {
                if self.host_read {
                    self.ctrl_configure = true;
                    // Latch the address now so a host that reuses the
                    // register immediately cannot race the transfer.
                    self.ctrl_address = self.host_address;
                    self.phase = DtrWrapperPhase::ConfigureWait;
                }
            }
            DtrWrapperPhase::ConfigureWait => {
                self.ctrl_configure = false;
                if wires.configure_done {
                    self.ctrl_read = true;
                    self.wait_cycles = 0;
                    self.phase = DtrWrapperPhase::TransferWait;
                }
            }
            DtrWrapperPhase::TransferWait => {
                if self.wait_cycles == self.ctrl.cycles_until_first_read_byte() - 1 {
                    self.wr_addr = 0;
                    self.new_byte = true;
                    self.phase = DtrWrapperPhase::Transfer;
                } else {
                    self.wait_cycles += 1;
                }
            }
            DtrWrapperPhase::Transfer => {
                // The data register only changes on full protocol clocks,
                // so capturing on every edge is safe; the cursor advances
                // every other edge.
                self.buf[self.wr_addr] = wires.data;
                let new_byte = self.new_byte;
                self.new_byte = !new_byte;
                if self.wr_addr == N - 1 {
                    self.ctrl_read = false;
                    self.read_done = true;
                    self.phase = DtrWrapperPhase::Done;
                } else if !new_byte {
                    self.wr_addr += 1;
                }
            }
            DtrWrapperPhase::Done => {
                if !self.host_read {
                    self.read_done = false;
                    self.phase = DtrWrapperPhase::Idle;
                }
            }
        }

        self.io_in = self.dev.edge(&wires);
    }
}

impl<D: QuadBusDevice, const N: usize> ReadPort for DtrReader<D, N> {
    fn set_read(&mut self, on: bool) {
        self.host_read = on;
    }

    fn set_address(&mut self, address: u32) {
        self.host_address = address;
    }

    fn read_done(&self) -> bool {
        self.read_done
    }

    fn buffered_byte(&self, index: usize) -> u8 {
        self.buf[index]
    }

    fn capacity(&self) -> usize {
        N
    }

    fn step(&mut self) {
        self.tick();
    }
}
