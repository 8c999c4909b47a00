use proc_bitfield::bitfield;

bitfield! {
    /// A 16-bit Thumb opcode with named accessors for every operand field
    /// the instruction set uses. Fields overlap freely; each handler reads
    /// only the ones its encoding defines.
    #[derive(Clone, Copy, Eq, PartialEq)]
    pub struct ThumbOp(u16): Debug, FromRaw, IntoRaw, DerefRaw {
        /// Low register, usually the destination.
        pub r1: u8 @ 0..=2,

        /// Low register, usually the first source.
        pub r2: u8 @ 3..=5,

        /// Low register, second source of three-register forms.
        pub r3: u8 @ 6..=8,

        /// 3-bit immediate of adds/subs imm3.
        pub imm3: u8 @ 6..=8,

        /// 5-bit immediate of shifts and offset loads/stores.
        pub imm5: u8 @ 6..=10,

        /// 7-bit immediate of the SP adjustment forms.
        pub imm7: u8 @ 0..=6,

        /// 8-bit immediate, also the register bitmap of push/pop/stm/ldm.
        pub imm8: u8 @ 0..=7,

        /// 11-bit immediate of the unconditional branch.
        pub imm11: u16 @ 0..=10,

        /// The LR bit of push / the PC bit of pop.
        pub extra_reg: bool @ 8,

        /// 4-bit register of the high-register and bx/blx forms.
        pub r2_4: u8 @ 3..=6,

        /// Low register encoded next to an 8-bit immediate.
        pub r_imm8: u8 @ 8..=10,

        /// Condition code of the conditional branch.
        pub cond: u8 @ 8..=11,
    }
}

impl ThumbOp {
    /// 4-bit destination of the high-register forms; bit 7 of the opcode
    /// carries the high bit, bits 2:0 the rest.
    pub fn r1_4(self) -> u8 {
        (((self.0 >> 4) & 0x08) | (self.0 & 0x07)) as u8
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fields_extract_the_documented_bits() {
        let op = ThumbOp(0xffff);
        assert_eq!(op.r1(), 7);
        assert_eq!(op.r2(), 7);
        assert_eq!(op.r3(), 7);
        assert_eq!(op.imm5(), 0x1f);
        assert_eq!(op.imm7(), 0x7f);
        assert_eq!(op.imm8(), 0xff);
        assert_eq!(op.imm11(), 0x7ff);
        assert_eq!(op.r2_4(), 0xf);
        assert_eq!(op.r_imm8(), 7);
        assert_eq!(op.cond(), 0xf);
        assert_eq!(op.r1_4(), 0xf);

        // mov pc, r1: bit 7 supplies the destination's high bit.
        let op = ThumbOp(0x468f);
        assert_eq!(op.r1_4(), 15);
        assert_eq!(op.r2_4(), 1);

        let op = ThumbOp(0x1888);
        assert_eq!(op.r1(), 0);
        assert_eq!(op.r2(), 1);
        assert_eq!(op.r3(), 2);
    }

    #[test]
    fn extra_reg_is_bit_eight() {
        assert!(ThumbOp(0xb510).extra_reg()); // push {r4, lr}
        assert!(!ThumbOp(0xb410).extra_reg()); // push {r4}
    }
}
