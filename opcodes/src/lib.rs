//! Thumb-1 (ARMv6-M) instruction encodings: the handler catalogue, the
//! 64 Ki-entry decode table, and the opcode bitfield accessors.
//!
//! Everything here is pure data about the instruction set. Execution lives
//! in the `thumbcore` crate.

mod decode;
mod encoding;
mod fields;

pub use decode::DecoderTable;
pub use encoding::{Encoding, Handler, ENCODINGS};
pub use fields::ThumbOp;
