use thiserror::Error;

/// Fatal execution faults. None of these are recoverable at this layer;
/// the simulator decides whether to stop or dump state.
///
/// `addr` is always the address of the faulting instruction itself, i.e.
/// the PC the handler observed minus the pipeline offset of 2.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CoreError {
    /// The decode table mapped the halfword to no encoding.
    #[error("{core}: undefined instruction {opcode:#06x} at {addr:#010x}")]
    Undefined { core: String, opcode: u16, addr: u32 },

    /// First halfword of a 32-bit instruction; wide decode is unsupported.
    #[error("{core}: 32-bit instruction {opcode:#06x} at {addr:#010x} not supported")]
    Thumb2 { core: String, opcode: u16, addr: u32 },

    /// A recognised instruction whose effects are out of scope (cps, udf,
    /// svc).
    #[error("{core}: {mnemonic} not implemented at {addr:#010x}")]
    Unimplemented {
        core: String,
        mnemonic: &'static str,
        addr: u32,
    },

    /// Condition slots 0xE and 0xF of the conditional branch.
    #[error("{core}: invalid condition code at {addr:#010x}")]
    InvalidCondition { core: String, addr: u32 },
}
