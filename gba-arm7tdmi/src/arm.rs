// Decoder + executor per il set ARM a 32 bit (§4.5).
//
// L'albero binario qui sotto è la traduzione diretta, nodo per nodo, della
// tabella di classificazione dell'originale: ogni nodo è un test su un bit
// singolo o su una maschera, con un salto se il test è vero e un fallthrough
// (nodo successivo) se è falso. È il classificatore autoritativo: non va
// riorganizzato per "semplificarlo".

use crate::cpu::MemoryBus;
use crate::flags;
use crate::registers::Registers;
use crate::shifter::{shift_immediate, shift_register, ShiftType};

#[derive(Debug, Clone, Copy)]
enum TreeNode {
    Bit(u32, usize),
    Mask(u32, u32, usize),
    Leaf(ArmOp),
}

#[derive(Debug, Clone, Copy)]
enum ArmOp {
    DataProcess,
    Psr,
    Multiply,
    Bx,
    Clz,
    DataTransfer,
    BlockTransfer,
    Branch,
    Undef,
}

use ArmOp::*;
use TreeNode::*;

const ARM_TREE: [TreeNode; 49] = [
    /*0*/ Bit(27, 36),
    /*1*/ Bit(26, 31),
    /*2*/ Bit(25, 28),
    /*3*/ Bit(4, 9),
    /*4*/ Mask(25 << 20, 16 << 20, 6),
    /*5*/ Leaf(DataProcess),
    /*6*/ Bit(7, 8),
    /*7*/ Leaf(Psr),
    /*8*/ Leaf(Multiply),
    /*9*/ Bit(7, 19),
    /*10*/ Mask(25 << 20, 16 << 20, 12),
    /*11*/ Leaf(DataProcess),
    /*12*/ Bit(6, 16),
    /*13*/ Bit(22, 15),
    /*14*/ Leaf(Bx),
    /*15*/ Leaf(Clz),
    /*16*/ Bit(5, 18),
    /*17*/ Leaf(Undef),
    /*18*/ Leaf(Undef),
    /*19*/ Mask(3 << 5, 0, 23),
    /*20*/ Bit(22, 22),
    /*21*/ Leaf(DataTransfer),
    /*22*/ Leaf(DataTransfer),
    /*23*/ Bit(24, 27),
    /*24*/ Bit(23, 26),
    /*25*/ Leaf(Multiply),
    /*26*/ Leaf(Multiply),
    /*27*/ Leaf(DataTransfer),
    /*28*/ Mask(25 << 20, 16 << 20, 30),
    /*29*/ Leaf(DataProcess),
    /*30*/ Leaf(Psr),
    /*31*/ Bit(25, 33),
    /*32*/ Leaf(DataTransfer),
    /*33*/ Bit(4, 35),
    /*34*/ Leaf(DataTransfer),
    /*35*/ Leaf(Undef),
    /*36*/ Bit(26, 40),
    /*37*/ Bit(25, 39),
    /*38*/ Leaf(BlockTransfer),
    /*39*/ Leaf(Branch),
    /*40*/ Bit(25, 44),
    /*41*/ Mask(15 << 21, 2 << 21, 43),
    /*42*/ Leaf(Undef),
    /*43*/ Leaf(Undef),
    /*44*/ Bit(24, 48),
    /*45*/ Bit(4, 47),
    /*46*/ Leaf(Undef),
    /*47*/ Leaf(Undef),
    /*48*/ Leaf(Undef),
];

fn navigate_tree(instr: u32) -> ArmOp {
    let mut pos = 0usize;
    loop {
        match ARM_TREE[pos] {
            Bit(bit, target) => {
                if instr >> bit & 1 != 0 {
                    pos = target;
                } else {
                    pos += 1;
                }
            }
            Mask(mask, value, target) => {
                if instr & mask == value {
                    pos = target;
                } else {
                    pos += 1;
                }
            }
            Leaf(op) => return op,
        }
    }
}

/// Esegue un'istruzione ARM il cui condition code è già stato verificato vero.
pub fn execute<M: MemoryBus>(instr: u32, regs: &mut Registers, bus: &mut M) {
    match navigate_tree(instr) {
        DataProcess => data_process(instr, regs),
        Psr => psr(instr, regs),
        Multiply => multiply(instr, regs),
        Bx => branch_exchange(instr, regs),
        Clz => clz(instr, regs),
        DataTransfer => data_transfer(instr, regs, bus),
        BlockTransfer => block_transfer(instr, regs, bus),
        Branch => branch(instr, regs),
        Undef => {}
    }
}

/// Opcode del campo data-processing (bit 24-21).
#[allow(dead_code)]
pub mod data_processing {
    pub const AND: u32 = 0x0;
    pub const EOR: u32 = 0x1;
    pub const SUB: u32 = 0x2;
    pub const RSB: u32 = 0x3;
    pub const ADD: u32 = 0x4;
    pub const ADC: u32 = 0x5;
    pub const SBC: u32 = 0x6;
    pub const RSC: u32 = 0x7;
    pub const TST: u32 = 0x8;
    pub const TEQ: u32 = 0x9;
    pub const CMP: u32 = 0xA;
    pub const CMN: u32 = 0xB;
    pub const ORR: u32 = 0xC;
    pub const MOV: u32 = 0xD;
    pub const BIC: u32 = 0xE;
    pub const MVN: u32 = 0xF;
}

/// Operand2 rotato per la forma immediata (bit 25 = 1): 8 bit ruotati a
/// destra di rotate*2. Un rotate di 0 lascia l'immediato intatto e il carry
/// invariato -- a differenza della forma a registro, qui non c'è RRX.
fn decode_operand2_immediate(instr: u32, carry_in: bool) -> (u32, bool) {
    let imm8 = instr & 0xFF;
    let rotate = (instr >> 8 & 0xF) * 2;
    if rotate == 0 {
        (imm8, carry_in)
    } else {
        let value = imm8.rotate_right(rotate);
        (value, value & 0x8000_0000 != 0)
    }
}

fn decode_operand2_register(instr: u32, regs: &Registers, carry_in: bool) -> (u32, bool) {
    let shift_field = instr >> 7 & 0x1F;
    let ty = ShiftType::from_bits(instr >> 5);
    let by_register = instr >> 4 & 1 != 0;
    let rm = (instr & 0xF) as usize;
    let value = regs.r[rm];
    let r = if by_register {
        let rs = (shift_field >> 1 & 0xF) as usize;
        shift_register(value, regs.r[rs] & 0xFF, ty, carry_in)
    } else {
        shift_immediate(value, shift_field, ty, carry_in)
    };
    (r.value, r.carry)
}

fn data_process(instr: u32, regs: &mut Registers) {
    let opcode = instr >> 21 & 0xF;
    let set_flags = instr >> 20 & 1 != 0;
    let rn = (instr >> 16 & 0xF) as usize;
    let rd = (instr >> 12 & 0xF) as usize;
    let carry_in = regs.flag_c();

    let (op2, op2_carry) = if instr >> 25 & 1 != 0 {
        decode_operand2_immediate(instr, carry_in)
    } else {
        decode_operand2_register(instr, regs, carry_in)
    };

    let rn_val = regs.r[rn];
    let carry_flag = regs.flag_c() as u32;
    use data_processing::*;

    let result = match opcode {
        AND => flags::logic(regs, rn_val & op2, op2_carry, set_flags),
        EOR => flags::logic(regs, rn_val ^ op2, op2_carry, set_flags),
        SUB => flags::compare(regs, rn_val, op2.wrapping_neg(), false, set_flags),
        RSB => flags::compare(regs, op2, rn_val.wrapping_neg(), false, set_flags),
        ADD => flags::compare(regs, rn_val, op2, false, set_flags),
        ADC => flags::compare(regs, rn_val, op2.wrapping_add(carry_flag), false, set_flags),
        SBC => flags::compare(
            regs,
            rn_val,
            op2.wrapping_neg().wrapping_add(carry_flag).wrapping_sub(1),
            false,
            set_flags,
        ),
        RSC => flags::compare(
            regs,
            op2,
            rn_val.wrapping_neg().wrapping_add(carry_flag).wrapping_sub(1),
            false,
            set_flags,
        ),
        TST => flags::logic(regs, rn_val & op2, op2_carry, set_flags),
        TEQ => flags::logic(regs, rn_val ^ op2, op2_carry, set_flags),
        CMP => flags::compare(regs, rn_val, op2.wrapping_neg(), false, set_flags),
        CMN => flags::compare(regs, rn_val, op2, false, set_flags),
        ORR => flags::logic(regs, rn_val | op2, op2_carry, set_flags),
        MOV => flags::logic(regs, op2, op2_carry, set_flags),
        BIC => flags::logic(regs, rn_val & !op2, op2_carry, set_flags),
        MVN => flags::logic(regs, !op2, op2_carry, set_flags),
        _ => unreachable!(),
    };

    // TST/TEQ/CMP/CMN non scrivono Rd.
    if !(TST..=CMN).contains(&opcode) {
        regs.r[rd] = result;
    }
}

/// MRS/MSR sul CPSR. Le forme SPSR (P=1) sono no-op: nessun registro di
/// stato salvato è modellato (niente banking di modalità).
fn psr(instr: u32, regs: &mut Registers) {
    let p_spsr = instr >> 22 & 1 != 0;
    if p_spsr {
        return;
    }
    let is_msr = instr >> 21 & 1 != 0;
    let rd = (instr >> 12 & 0xF) as usize;
    let field = instr >> 16 & 0xF;

    if !is_msr {
        regs.r[rd] = regs.cpsr;
        return;
    }

    let write_flags = field >> 3 & 1 != 0;
    let write_control = field & 1 != 0;
    let mut bitmask = 0u32;
    if write_flags {
        bitmask |= 0xF000_0000;
    }
    if write_control {
        bitmask |= 0xEF;
    }

    let operand = if instr >> 25 & 1 != 0 {
        let imm = instr & 0xFF;
        let rotate = (instr >> 8 & 0xF) * 2;
        imm.rotate_right(rotate)
    } else {
        let rm = (instr & 0xF) as usize;
        regs.r[rm]
    };

    regs.cpsr = regs.cpsr & !bitmask | operand & bitmask;
}

fn branch_exchange(instr: u32, regs: &mut Registers) {
    let link = instr >> 5 & 1 != 0;
    let rn = (instr & 0xF) as usize;
    if link {
        regs.set_lr(regs.pc().wrapping_sub(4));
    }
    let target = regs.r[rn];
    let thumb = target & 1 != 0;
    let dest = if thumb {
        target.wrapping_add(4).wrapping_sub(3)
    } else {
        target.wrapping_add(4)
    };
    regs.set_pc(dest);
    regs.set_thumb(thumb);
}

fn branch(instr: u32, regs: &mut Registers) {
    let link = instr >> 24 & 1 != 0;
    let offset = ((instr & 0xFF_FFFF) ^ 0x80_0000).wrapping_sub(0x80_0000);
    if link {
        regs.set_lr(regs.pc().wrapping_sub(4));
    }
    regs.set_pc(regs.pc().wrapping_add(4).wrapping_add(offset.wrapping_mul(4)));
}

fn clz(instr: u32, regs: &mut Registers) {
    let rd = (instr >> 12 & 0xF) as usize;
    let rm = (instr & 0xF) as usize;
    regs.r[rd] = regs.r[rm].leading_zeros();
}

fn multiply(instr: u32, regs: &mut Registers) {
    let mut opcode = instr >> 21 & 0xF;
    let set_flags = instr >> 20 & 1 != 0;
    let rd = (instr >> 16 & 0xF) as usize;
    let rn = (instr >> 12 & 0xF) as usize;
    let rs = (instr >> 8 & 0xF) as usize;
    let y = instr >> 6 & 1 != 0;
    let x = instr >> 5 & 1 != 0;
    let rm = (instr & 0xF) as usize;

    let mut rm_val = regs.r[rm];
    let mut rs_val = regs.r[rs];

    if opcode & 0x8 != 0 {
        // Varianti half-register ARMv5 (SMLAxy/SMLAWy/SMLALxy/SMULxy).
        opcode &= 0x3;
        let rs_half = ((rs_val >> if y { 16 } else { 0 }) & 0xFFFF) as i16 as i32;
        rs_val = rs_half as u32;
        if opcode != 1 {
            let rm_half = ((rm_val >> if x { 16 } else { 0 }) & 0xFFFF) as i16 as i32;
            rm_val = rm_half as u32;
        }
        match opcode {
            0 => {
                let product = (rm_val as i32).wrapping_mul(rs_val as i32);
                regs.r[rd] = (product as u32).wrapping_add(regs.r[rn]);
            }
            1 => {
                let rm_full = rm_val as i32;
                let product = (rm_full as i64).wrapping_mul(rs_val as i32 as i64);
                let acc = if y { regs.r[rn] as i32 as i64 } else { 0 };
                regs.r[rd] = ((product >> 16).wrapping_add(acc)) as u32;
            }
            2 => {
                let acc = (regs.r[rd] as u64) << 32 | regs.r[rn] as u64;
                let product = (rm_val as i32 as i64).wrapping_mul(rs_val as i32 as i64) as u64;
                let result = acc.wrapping_add(product);
                regs.r[rd] = (result >> 32) as u32;
                regs.r[rn] = result as u32;
            }
            3 => {
                regs.r[rd] = ((rm_val as i32).wrapping_mul(rs_val as i32)) as u32;
            }
            _ => unreachable!(),
        }
        return;
    }

    let signed = opcode & 0x2 != 0;
    let long = opcode & 0x4 != 0;
    let accumulate = opcode & 0x1 != 0;

    if signed {
        let result = (rm_val as i32 as i64).wrapping_mul(rs_val as i32 as i64);
        if long {
            let acc = if accumulate {
                (regs.r[rd] as u64) << 32 | regs.r[rn] as u64
            } else {
                0
            };
            let total = (acc as i64).wrapping_add(result) as u64;
            regs.r[rd] = (total >> 32) as u32;
            regs.r[rn] = total as u32;
            if set_flags {
                flags::multiply_flags_64(regs, total, true);
            }
        } else {
            let acc = if accumulate { regs.r[rn] } else { 0 };
            let total = (result as u32).wrapping_add(acc);
            regs.r[rd] = total;
            if set_flags {
                flags::multiply_flags_32(regs, total, true);
            }
        }
    } else {
        let result = (rm_val as u64).wrapping_mul(rs_val as u64);
        if long {
            let acc = if accumulate {
                (regs.r[rd] as u64) << 32 | regs.r[rn] as u64
            } else {
                0
            };
            let total = acc.wrapping_add(result);
            regs.r[rd] = (total >> 32) as u32;
            regs.r[rn] = total as u32;
            if set_flags {
                flags::multiply_flags_64(regs, total, true);
            }
        } else {
            let acc = if accumulate { regs.r[rn] } else { 0 };
            let total = (result as u32).wrapping_add(acc);
            regs.r[rd] = total;
            if set_flags {
                flags::multiply_flags_32(regs, total, true);
            }
        }
    }
}

/// Single/halfword/signed data transfer e SWP (§4.5, nodi 21/22/27/32/34).
fn data_transfer<M: MemoryBus>(instr: u32, regs: &mut Registers, bus: &mut M) {
    let double = instr >> 26 & 1 != 0; // D: single transfer (LDR/STR) quando bit 26 è impostato
    let rn = (instr >> 16 & 0xF) as usize;
    let rd = (instr >> 12 & 0xF) as usize;
    let pre = instr >> 24 & 1 != 0;
    let up = instr >> 23 & 1 != 0;
    let writeback = instr >> 21 & 1 != 0;
    let load = instr >> 20 & 1 != 0;
    let sign: i64 = if up { 1 } else { -1 };

    if double {
        // Single Data Transfer: LDR/STR [byte/word], immediato o registro offset.
        let byte = instr >> 22 & 1 != 0;
        let immediate_offset = instr >> 25 & 1 == 0;
        let offset = if immediate_offset {
            instr & 0xFFF
        } else {
            let shift_amount = instr >> 7 & 0x1F;
            let ty = ShiftType::from_bits(instr >> 5);
            let rm = (instr & 0xF) as usize;
            shift_immediate(regs.r[rm], shift_amount, ty, regs.flag_c()).value
        };

        let base = regs.r[rn];
        let offset_addr = apply_offset(base, offset, sign);
        let addr = if pre { offset_addr } else { base };
        if !pre || writeback {
            regs.r[rn] = offset_addr;
        }
        if load {
            let value = if byte {
                bus.read_byte(addr) as u32
            } else {
                bus.read_word(addr)
            };
            regs.r[rd] = value;
        } else if byte {
            bus.write_byte(addr, regs.r[rd] as u8);
        } else {
            bus.write_word(addr, regs.r[rd]);
        }
        return;
    }

    // Halfword/signed data transfer, e SWP quando Typ == 0.
    let ty = instr >> 5 & 0x3;
    let immediate_offset = instr >> 22 & 1 != 0;
    let offset = if immediate_offset {
        ((instr >> 8 & 0xF) << 4) | (instr & 0xF)
    } else {
        let rm = (instr & 0xF) as usize;
        regs.r[rm]
    };

    let base = regs.r[rn];
    let offset_addr = apply_offset(base, offset, sign);
    let addr = if pre { offset_addr } else { base };
    if !pre || writeback {
        regs.r[rn] = offset_addr;
    }

    match ty {
        0 => {
            // SWP/SWPB: Rm è il registro sorgente in questa forma (bit 3:0).
            let rm = (instr & 0xF) as usize;
            let byte = instr >> 22 & 1 != 0;
            let temp = regs.r[rm];
            if byte {
                let old = bus.read_byte(regs.r[rn]) as u32;
                bus.write_byte(regs.r[rn], temp as u8);
                regs.r[rd] = old;
            } else {
                let old = bus.read_word(regs.r[rn]);
                bus.write_word(regs.r[rn], temp);
                regs.r[rd] = old;
            }
        }
        1 => {
            if load {
                regs.r[rd] = bus.read_halfword(addr) as u32;
            } else {
                bus.write_halfword(addr, regs.r[rd] as u16);
            }
        }
        2 => {
            if load {
                regs.r[rd] = bus.read_byte_signed(addr);
            } else {
                regs.r[rd] = bus.read_word(addr);
                regs.r[rd + 1] = bus.read_word(addr.wrapping_add(4));
            }
        }
        3 => {
            if load {
                regs.r[rd] = bus.read_halfword_signed(addr);
            } else {
                bus.write_word(addr, regs.r[rd]);
                bus.write_word(addr.wrapping_add(4), regs.r[rd + 1]);
            }
        }
        _ => unreachable!(),
    }
}

fn apply_offset(base: u32, offset: u32, sign: i64) -> u32 {
    (base as i64 + sign * offset as i64) as u32
}

/// Block data transfer (LDM/STM, §4.5 nodo 38). Il bit S (caricamento
/// PSR/banco utente) non ha effetto: nessun banking di modalità è modellato.
fn block_transfer<M: MemoryBus>(instr: u32, regs: &mut Registers, bus: &mut M) {
    let pre = instr >> 24 & 1 != 0;
    let up = instr >> 23 & 1 != 0;
    let writeback = instr >> 21 & 1 != 0;
    let load = instr >> 20 & 1 != 0;
    let rn = (instr >> 16 & 0xF) as usize;
    let register_list = instr & 0xFFFF;

    let direction: i64 = if up { 1 } else { -1 };
    let mut addr = regs.r[rn] as i64;
    if pre {
        addr += 4 * direction;
    }

    // Ordine di trasferimento sempre ascendente per indice di registro; solo
    // la direzione dell'indirizzo dipende da U.
    for i in 0..16 {
        if register_list & (1 << i) != 0 {
            if load {
                regs.r[i] = bus.read_word(addr as u32);
            } else {
                bus.write_word(addr as u32, regs.r[i]);
            }
            addr += 4 * direction;
        }
    }

    if pre {
        addr -= 4 * direction;
    }
    if writeback {
        regs.r[rn] = addr as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::ARM7TDMI;

    #[derive(Default)]
    struct TestBus {
        mem: std::collections::HashMap<u32, u8>,
    }
    impl MemoryBus for TestBus {
        fn read_byte(&mut self, addr: u32) -> u8 {
            *self.mem.get(&addr).unwrap_or(&0)
        }
        fn read_halfword(&mut self, addr: u32) -> u16 {
            self.read_byte(addr) as u16 | (self.read_byte(addr + 1) as u16) << 8
        }
        fn read_word(&mut self, addr: u32) -> u32 {
            self.read_halfword(addr) as u32 | (self.read_halfword(addr + 2) as u32) << 16
        }
        fn write_byte(&mut self, addr: u32, value: u8) {
            self.mem.insert(addr, value);
        }
        fn write_halfword(&mut self, addr: u32, value: u16) {
            self.write_byte(addr, value as u8);
            self.write_byte(addr + 1, (value >> 8) as u8);
        }
        fn write_word(&mut self, addr: u32, value: u32) {
            self.write_halfword(addr, value as u16);
            self.write_halfword(addr + 2, (value >> 16) as u16);
        }
    }

    #[test]
    fn mov_immediate_sets_register_no_flags() {
        let mut cpu = ARM7TDMI::new();
        let mut bus = TestBus::default();
        // MOV R1, #0x42, S=0, AL
        let instr = 0xE3A0_1042u32;
        cpu.regs.set_pc(4); // r15 è size (4) avanti all'istruzione da prelevare a 0x0
        bus.write_word(0, instr);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.r[1], 0x42);
    }

    #[test]
    fn add_sets_carry_and_overflow_flags() {
        let mut regs = Registers::new();
        regs.r[0] = 0x7FFF_FFFF;
        regs.r[1] = 1;
        // ADD R2, R0, R1, S=1
        let instr = 0xE091_2001u32;
        data_process(instr, &mut regs);
        assert_eq!(regs.r[2], 0x8000_0000);
        assert!(regs.flag_v());
        assert!(regs.flag_n());
    }

    #[test]
    fn clz_of_zero_is_32() {
        let mut regs = Registers::new();
        regs.r[0] = 0;
        // CLZ R1, R0 = 0xE16F1F10
        clz(0xE16F_1F10, &mut regs);
        assert_eq!(regs.r[1], 32);
    }

    #[test]
    fn branch_with_link_sets_lr_to_instruction_plus_4() {
        let mut regs = Registers::new();
        // Il driver ha già portato r15 due istruzioni avanti (fetch a
        // 0x1004, size=4 -> 0x1004 + 8).
        regs.set_pc(0x100C);
        branch(0xEB00_0000, &mut regs);
        assert_eq!(regs.lr(), 0x1008);
        assert_eq!(regs.pc(), 0x1010);
    }

    #[test]
    fn single_data_transfer_loads_word_not_swp() {
        let mut regs = Registers::new();
        let mut bus = TestBus::default();
        regs.r[1] = 0x2000;
        bus.write_word(0x2004, 0xCAFE_BABE);
        // LDR r0, [r1, #4] -- bit26=1 selects the single-transfer body.
        data_transfer(0xE591_0004, &mut regs, &mut bus);
        assert_eq!(regs.r[0], 0xCAFE_BABE);
    }

    #[test]
    fn halfword_data_transfer_loads_unsigned_halfword() {
        let mut regs = Registers::new();
        let mut bus = TestBus::default();
        regs.r[1] = 0x2000;
        bus.write_halfword(0x2000, 0xBEEF);
        // LDRH r0, [r1] -- bit26=0 selects the halfword/signed body.
        data_transfer(0xE1D1_00B0, &mut regs, &mut bus);
        assert_eq!(regs.r[0], 0xBEEF);
    }

    #[test]
    fn block_transfer_writes_registers_in_ascending_order() {
        let mut regs = Registers::new();
        let mut bus = TestBus::default();
        regs.r[0] = 0x10;
        regs.r[1] = 0x20;
        regs.r[13] = 0x1000;
        // STMIA R13!, {R0,R1}
        block_transfer(0x00A0_0003 | (1 << 23) | (1 << 21) | (13 << 16), &mut regs, &mut bus);
        assert_eq!(bus.read_word(0x1000), 0x10);
        assert_eq!(bus.read_word(0x1004), 0x20);
        assert_eq!(regs.r[13], 0x1008);
    }
}
