use std::sync::LazyLock;

use crate::encoding::{Encoding, Handler, ENCODINGS};

static TABLE: LazyLock<DecoderTable> = LazyLock::new(DecoderTable::build);

/// A flat map from every possible 16-bit opcode to its [Handler], so that
/// dispatch is a single indexed load.
///
/// Immutable once built; one process-wide instance is shared by all cores
/// through [Handler::decode].
pub struct DecoderTable(Box<[Handler; 0x1_0000]>);

impl DecoderTable {
    /// Scan the encoding catalogue for all 65 536 opcodes, keeping the most
    /// specific matching pattern for each. Opcodes no pattern claims map to
    /// [Handler::Undefined].
    pub fn build() -> Self {
        let mut table = Box::new([Handler::Undefined; 0x1_0000]);

        for (opcode, slot) in table.iter_mut().enumerate() {
            let opcode = opcode as u16;
            let mut best: Option<&Encoding> = None;

            for enc in &ENCODINGS {
                if opcode & enc.mask != enc.value {
                    continue;
                }

                match best {
                    Some(prev) if !enc.more_specific_than(prev) => {}
                    _ => best = Some(enc),
                }
            }

            if let Some(enc) = best {
                *slot = enc.handler;
            }
        }

        Self(table)
    }

    pub fn lookup(&self, opcode: u16) -> Handler {
        self.0[opcode as usize]
    }
}

impl Handler {
    /// Classify a halfword through the shared [DecoderTable].
    pub fn decode(opcode: u16) -> Self {
        TABLE.lookup(opcode)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// For every opcode, among the catalogue entries that match it there
    /// must be exactly one that is more specific than all of the others.
    /// Two incomparable patterns claiming the same opcode would make decode
    /// results depend on catalogue order.
    #[test]
    fn matching_patterns_have_a_unique_maximum() {
        for opcode in 0..=0xffffu16 {
            let matching: Vec<&Encoding> = ENCODINGS
                .iter()
                .filter(|enc| opcode & enc.mask == enc.value)
                .collect();

            let maximal: Vec<&&Encoding> = matching
                .iter()
                .filter(|enc| matching.iter().all(|other| enc.more_specific_than(other)))
                .collect();

            if matching.is_empty() {
                assert_eq!(Handler::decode(opcode), Handler::Undefined);
            } else {
                assert_eq!(
                    maximal.len(),
                    1,
                    "opcode 0x{opcode:04x} has {} maximal patterns among {:?}",
                    maximal.len(),
                    matching.iter().map(|enc| enc.handler).collect::<Vec<_>>()
                );
                assert_eq!(Handler::decode(opcode), maximal[0].handler);
            }
        }
    }

    /// Hand-assembled opcodes land on the expected handlers.
    #[test]
    fn decode_spot_checks() {
        // movs r0, r0 assembles as lsls r0, r0, #0.
        assert_eq!(Handler::decode(0x0000), Handler::LslsImm);
        assert_eq!(Handler::decode(0x4140), Handler::AdcsReg);
        assert_eq!(Handler::decode(0x4770), Handler::BxReg4); // bx lr
        assert_eq!(Handler::decode(0x46c0), Handler::MovReg4); // mov r8, r8
        assert_eq!(Handler::decode(0xb510), Handler::Push); // push {r4, lr}
        assert_eq!(Handler::decode(0xbd10), Handler::Pop); // pop {r4, pc}
        assert_eq!(Handler::decode(0xb662), Handler::Cps);
        assert_eq!(Handler::decode(0xb672), Handler::Cps);
        assert_eq!(Handler::decode(0xbf00), Handler::Nop);
        assert_eq!(Handler::decode(0xbf30), Handler::Wfi);
        assert_eq!(Handler::decode(0xd0fe), Handler::BCond);
        assert_eq!(Handler::decode(0xe7fe), Handler::B); // b .
    }

    /// The udf/svc patterns carve the 0xE and 0xF condition slots out of
    /// the conditional-branch space.
    #[test]
    fn udf_and_svc_override_conditional_branch() {
        assert_eq!(Handler::decode(0xde00), Handler::Udf);
        assert_eq!(Handler::decode(0xdeff), Handler::Udf);
        assert_eq!(Handler::decode(0xdf00), Handler::Svc);
        assert_eq!(Handler::decode(0xdfab), Handler::Svc);
        assert_eq!(Handler::decode(0xdd00), Handler::BCond);
    }

    /// Only 0xf000..0xf7ff is recognised as a 32-bit prefix; the
    /// 0xe800..0xefff range matches nothing.
    #[test]
    fn wide_prefix_and_holes() {
        assert_eq!(Handler::decode(0xf000), Handler::Thumb2);
        assert_eq!(Handler::decode(0xf7ff), Handler::Thumb2);
        assert_eq!(Handler::decode(0xe800), Handler::Undefined);
        assert_eq!(Handler::decode(0xefff), Handler::Undefined);
        // bx with nonzero SBZ bits is not a valid encoding.
        assert_eq!(Handler::decode(0x4771), Handler::Undefined);
        // The hint space past sev is unallocated in ARMv6-M.
        assert_eq!(Handler::decode(0xbf50), Handler::Undefined);
    }
}
