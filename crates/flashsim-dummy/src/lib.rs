//! flashsim-dummy - In-memory flash emulators for testing
//!
//! This crate provides bus-peer doubles for both read controllers: they
//! react to the wire-level outputs edge by edge exactly like the real chip
//! (and like the testbenches the hardware was validated against), serve
//! bytes from an in-memory payload wrapping modulo its length, and record
//! what they observed on the wires - decoded opcodes and addresses,
//! output-enable faults, chip-select idle gaps - so tests can assert the
//! bit-level protocol contract, not just the returned data.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod quad;
#[cfg(feature = "alloc")]
mod sdr;

#[cfg(feature = "alloc")]
pub use quad::DummyQuadFlash;
#[cfg(feature = "alloc")]
pub use sdr::DummySdrFlash;

#[cfg(test)]
pub(crate) mod testutil {
    use alloc::vec::Vec;

    /// Small deterministic generator for randomized test coverage.
    pub struct Lcg(u32);

    impl Lcg {
        pub fn new(seed: u32) -> Self {
            Self(seed)
        }

        pub fn next_u32(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
            self.0
        }

        pub fn below(&mut self, n: u32) -> u32 {
            self.next_u32() % n
        }

        pub fn bytes(&mut self, len: usize) -> Vec<u8> {
            (0..len).map(|_| self.next_u32() as u8).collect()
        }
    }

    /// The bytes a read of `len` starting at `address` must return from a
    /// payload that repeats modulo its length.
    pub fn expected_bytes(payload: &[u8], address: u32, len: usize) -> Vec<u8> {
        let start = address as usize % payload.len();
        (0..len).map(|i| payload[(start + i) % payload.len()]).collect()
    }
}
