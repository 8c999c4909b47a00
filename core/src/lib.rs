//! Thumb-1 (ARMv6-M) interpreter core for Cortex-M0 class simulation.
//!
//! The core executes one instruction per [CortexM0::step] against a
//! [Bus] supplied by the surrounding simulator. Decoding lives in the
//! `thumbcore_opcodes` crate, re-exported here for convenience.

mod bus;
mod cpu;
mod error;

pub use bus::{Bus, FlatRam};
pub use cpu::{Apsr, CortexM0, LR, PC, SP};
pub use error::CoreError;

pub use thumbcore_opcodes::{DecoderTable, Handler, ThumbOp};
