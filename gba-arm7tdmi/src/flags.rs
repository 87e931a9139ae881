// Flag-generating arithmetic (§4.3.3)
//
// Two primitives cover every ARM/THUMB data-processing opcode: `compare` for
// anything that is fundamentally an addition (ADD/SUB/CMP/CMN/RSB/ADC/SBC/RSC,
// with subtraction modelled as addition of the bitwise-complemented operand),
// and `logic` for AND/ORR/EOR/BIC/MOV/MVN/TST/TEQ, which only ever touch N/Z.

use crate::registers::Registers;

/// Outcome of an addition-family operation: the wrapped 32-bit result plus the
/// four flags it would produce if written to CPSR.
#[derive(Debug, Clone, Copy)]
pub struct ArithResult {
    pub result: u32,
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
}

/// `a + b` at 33-bit precision, deriving N/Z/C/V. Subtraction is obtained by
/// passing `b` pre-negated (two's complement) by the caller; a separate
/// `carry_in` parameter lets ADC/SBC/RSC fold in the existing carry without
/// duplicating this routine.
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> ArithResult {
    let wide = a as u64 + b as u64 + carry_in as u64;
    let result = wide as u32;
    let n = result & 0x8000_0000 != 0;
    let z = result == 0;
    let c = wide > 0xFFFF_FFFF;
    let sign_a = a & 0x8000_0000 != 0;
    let sign_b = b & 0x8000_0000 != 0;
    let v = (sign_a == sign_b) && (sign_a != n);
    ArithResult { result, n, z, c, v }
}

/// Apply an `ArithResult` to CPSR (N/Z/C/V) if `set_flags` is set, and return
/// the wrapped result either way.
pub fn compare(regs: &mut Registers, a: u32, b: u32, carry_in: bool, set_flags: bool) -> u32 {
    let r = add_with_carry(a, b, carry_in);
    if set_flags {
        regs.set_flags(r.n, r.z, r.c, r.v);
    }
    r.result
}

/// AND/ORR/EOR/BIC/MOV/MVN/TST/TEQ: only N and Z are derived from the result;
/// C is whatever the shifter produced (untouched here), V is left alone.
pub fn logic(regs: &mut Registers, result: u32, shifter_carry: bool, set_flags: bool) -> u32 {
    if set_flags {
        regs.set_flag_n(result & 0x8000_0000 != 0);
        regs.set_flag_z(result == 0);
        regs.set_flag_c(shifter_carry);
    }
    result
}

/// Multiply family flag rule: N/Z from the 32-bit result, C left unaffected
/// (undefined on real hardware; this interpreter never touches it), V unaffected.
pub fn multiply_flags_32(regs: &mut Registers, result: u32, set_flags: bool) {
    if set_flags {
        regs.set_flag_n(result & 0x8000_0000 != 0);
        regs.set_flag_z(result == 0);
    }
}

/// 64-bit multiply flag rule: N from bit 63, Z from the full 64-bit result.
pub fn multiply_flags_64(regs: &mut Registers, result: u64, set_flags: bool) {
    if set_flags {
        regs.set_flag_n(result & 0x8000_0000_0000_0000 != 0);
        regs.set_flag_z(result == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_zero_flag_matches_masked_sum() {
        for a in [0u32, 1, 0xFFFF_FFFF, 0x8000_0000] {
            let b = (!a).wrapping_add(1); // -a
            let r = add_with_carry(a, b, false);
            assert!(r.z, "a={a:#x} b={b:#x}");
        }
    }

    #[test]
    fn overflow_set_iff_operand_signs_match_and_differ_from_result() {
        let r = add_with_carry(0x7FFF_FFFF, 0x0000_0001, false);
        assert!(r.v);
        assert_eq!(r.result, 0x8000_0000);

        let r = add_with_carry(0x0000_0001, 0xFFFF_FFFF, false);
        assert!(!r.v); // 1 + (-1), signs differ, no overflow possible
    }

    #[test]
    fn subtraction_via_complement_matches_wrapping_sub() {
        let a = 10u32;
        let b = 3u32;
        // SUB: a - b == a + (!b) + 1
        let r = add_with_carry(a, !b, true);
        assert_eq!(r.result, a.wrapping_sub(b));
    }
}
