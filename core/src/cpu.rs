use std::fmt::Debug;

use proc_bitfield::bitfield;
use thumbcore_opcodes::{Handler, ThumbOp};

use crate::{Bus, CoreError};

mod exec;

/// Stack pointer alias (r13).
pub const SP: usize = 13;

/// Link register alias (r14).
pub const LR: usize = 14;

/// Program counter alias (r15).
pub const PC: usize = 15;

/// One ARMv6-M (Cortex-M0 class) core: sixteen registers, the APSR flags,
/// and the halfword currently being executed.
///
/// The core does not own its bus; the surrounding simulator passes one to
/// every [CortexM0::step] call, which keeps a single bus shareable between
/// cores and peripherals.
#[derive(Clone, Eq, PartialEq)]
pub struct CortexM0 {
    /// Name used in traces and fault messages, e.g. `"core0"`.
    pub name: String,

    /// The register file. Indices 13, 14, 15 are SP, LR, PC.
    pub r: [u32; 16],

    /// The condition flags.
    pub apsr: Apsr,

    /// The halfword of the currently-executing instruction; handlers pull
    /// their operand fields out of it.
    pub opcode: ThumbOp,
}

impl CortexM0 {
    /// Create a core with the given initial PC and SP. Bit 0 of the PC is
    /// the Thumb interworking bit in a vector-table entry and is masked off
    /// the executing address.
    pub fn new(name: impl Into<String>, pc: u32, sp: u32) -> Self {
        let mut r = [0; 16];
        r[SP] = sp;
        r[PC] = pc & !1;

        Self {
            name: name.into(),
            r,
            apsr: Apsr::from(0),
            opcode: ThumbOp::from(0),
        }
    }

    /// Fetch, decode, and execute one instruction.
    ///
    /// PC is advanced past the fetched halfword before the handler runs, so
    /// every handler observes its own address plus 2 (the pipeline
    /// convention all PC-relative encodings assume). Branch handlers then
    /// overwrite PC outright.
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<(), CoreError> {
        let opcode = bus.read_h(self.r[PC]);

        self.r[PC] = self.r[PC].wrapping_add(2);
        self.opcode = ThumbOp::from(opcode);

        self.exec(Handler::decode(opcode), bus)
    }
}

impl Debug for CortexM0 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {{ ", self.name)?;

        for i in 0..13 {
            write!(f, "r{i}:{:08X} ", self.r[i])?;
        }

        write!(f, "SP:{:08X} ", self.r[SP])?;
        write!(f, "LR:{:08X} ", self.r[LR])?;
        write!(f, "PC:{:08X} ", self.r[PC])?;

        write!(f, "n:{:01} ", self.apsr.n() as usize)?;
        write!(f, "z:{:01} ", self.apsr.z() as usize)?;
        write!(f, "c:{:01} ", self.apsr.c() as usize)?;
        write!(f, "v:{:01} ", self.apsr.v() as usize)?;

        write!(f, "}}")
    }
}

bitfield! {
    /// The Application Program Status Register, reduced to the four
    /// condition flags at their architectural bit positions. Handlers only
    /// ever touch the named booleans; the packed layout exists for
    /// inspection and state dumps.
    #[derive(Clone, Copy, Eq, PartialEq)]
    pub struct Apsr(u32): Debug, FromRaw, IntoRaw, DerefRaw {
        /// Overflow flag.
        pub v: bool @ 28,

        /// Carry flag.
        pub c: bool @ 29,

        /// Zero flag.
        pub z: bool @ 30,

        /// Negative flag.
        pub n: bool @ 31,
    }
}
