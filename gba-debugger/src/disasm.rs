// Disassemblatore (collaboratore esterno, §6.5): consuma `(opcode, mode, pc)`
// e produce una stringa mnemonica + operandi. Non è un printer byte-perfetto
// in stile GBATEK -- copre i suffissi di condizione e le forme di operando
// comuni descritte in §4.4/§4.5, non ogni variante di sintassi che un
// assemblatore "vero" riconoscerebbe.

fn reg_name(i: u32) -> String {
    match i {
        13 => "sp".to_string(),
        14 => "lr".to_string(),
        15 => "pc".to_string(),
        n => format!("r{n}"),
    }
}

const ARM_COND_MNEMONIC: [&str; 16] = [
    "eq", "ne", "cs", "cc", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le", "", "nv",
];

fn arm_cond(instr: u32) -> &'static str {
    ARM_COND_MNEMONIC[(instr >> 28 & 0xF) as usize]
}

const DP_MNEMONIC: [&str; 16] = [
    "and", "eor", "sub", "rsb", "add", "adc", "sbc", "rsc", "tst", "teq", "cmp", "cmn", "orr",
    "mov", "bic", "mvn",
];

const SHIFT_MNEMONIC: [&str; 4] = ["lsl", "lsr", "asr", "ror"];

/// Disassembla una singola istruzione. `thumb` seleziona il set a 16 bit;
/// `pc` è il valore di r15 "pipeline-ahead" osservato dall'istruzione, usato
/// per risolvere i riferimenti PC-relative (`ldr rd, [pc, #n]`) e i branch.
pub fn disassemble(opcode: u32, thumb: bool, pc: u32) -> String {
    if thumb {
        disassemble_thumb(opcode as u16, pc)
    } else {
        disassemble_arm(opcode, pc)
    }
}

fn disassemble_arm(instr: u32, pc: u32) -> String {
    let cond = arm_cond(instr);

    if instr & 0x0FFF_FFF0 == 0x012F_FF10 {
        let rn = instr & 0xF;
        let op = if instr >> 5 & 1 != 0 { "blx" } else { "bx" };
        return format!("{op}{cond} {}", reg_name(rn));
    }

    if instr & 0x0FE0_00F0 == 0x0000_0090 {
        return disassemble_multiply(instr, cond);
    }

    if instr & 0x0F00_0000 == 0x0A00_0000 || instr & 0x0F00_0000 == 0x0B00_0000 {
        let link = instr >> 24 & 1 != 0;
        let offset = ((instr & 0xFF_FFFF) ^ 0x80_0000).wrapping_sub(0x80_0000);
        let target = pc.wrapping_add(offset.wrapping_mul(4));
        let mnem = if link { "bl" } else { "b" };
        return format!("{mnem}{cond} {target:#010x}");
    }

    if instr & 0x0E00_0000 == 0x0800_0000 {
        let load = instr >> 20 & 1 != 0;
        let mnem = if load { "ldm" } else { "stm" };
        let rn = instr >> 16 & 0xF;
        let list = (0..16u32).filter(|i| instr & (1 << i) != 0).map(reg_name).collect::<Vec<_>>().join(",");
        let writeback = if instr >> 21 & 1 != 0 { "!" } else { "" };
        return format!("{mnem}{cond} {}{writeback}, {{{list}}}", reg_name(rn));
    }

    if instr & 0x0C00_0000 == 0x0400_0000 {
        return disassemble_single_transfer(instr, cond);
    }

    if instr & 0x0FBF_0FFF == 0x010F_0000 {
        let rd = instr >> 12 & 0xF;
        return format!("mrs{cond} {}, cpsr", reg_name(rd));
    }
    if instr & 0x0DB0_F000 == 0x0120_F000 {
        return format!("msr{cond} cpsr, ...");
    }

    if instr & 0x0C00_0000 == 0x0000_0000 {
        return disassemble_data_processing(instr, cond);
    }

    format!("undef{cond} {instr:#010x}")
}

fn disassemble_multiply(instr: u32, cond: &str) -> String {
    let opcode = instr >> 21 & 0xF;
    let s = if instr >> 20 & 1 != 0 { "s" } else { "" };
    let rd = instr >> 16 & 0xF;
    let rn = instr >> 12 & 0xF;
    let rs = instr >> 8 & 0xF;
    let rm = instr & 0xF;
    match opcode {
        0 => format!("mul{cond}{s} {}, {}, {}", reg_name(rd), reg_name(rm), reg_name(rs)),
        1 => format!(
            "mla{cond}{s} {}, {}, {}, {}",
            reg_name(rd),
            reg_name(rm),
            reg_name(rs),
            reg_name(rn)
        ),
        4..=7 => {
            let mnem = match opcode {
                4 => "umull",
                5 => "umlal",
                6 => "smull",
                _ => "smlal",
            };
            format!(
                "{mnem}{cond}{s} {}, {}, {}, {}",
                reg_name(rn),
                reg_name(rd),
                reg_name(rm),
                reg_name(rs)
            )
        }
        _ => format!("mul?{cond} {instr:#010x}"),
    }
}

fn disassemble_data_processing(instr: u32, cond: &str) -> String {
    let opcode = (instr >> 21 & 0xF) as usize;
    let s = if instr >> 20 & 1 != 0 { "s" } else { "" };
    let rn = instr >> 16 & 0xF;
    let rd = instr >> 12 & 0xF;
    let mnem = DP_MNEMONIC[opcode];

    let op2 = if instr >> 25 & 1 != 0 {
        let imm = instr & 0xFF;
        let rotate = (instr >> 8 & 0xF) * 2;
        format!("#{:#x}", imm.rotate_right(rotate))
    } else {
        let rm = instr & 0xF;
        let ty = SHIFT_MNEMONIC[(instr >> 5 & 0x3) as usize];
        if instr >> 4 & 1 != 0 {
            let rs = instr >> 8 & 0xF;
            format!("{}, {ty} {}", reg_name(rm), reg_name(rs))
        } else {
            let amount = instr >> 7 & 0x1F;
            if amount == 0 {
                reg_name(rm)
            } else {
                format!("{}, {ty} #{amount}", reg_name(rm))
            }
        }
    };

    if (0x8..=0xB).contains(&opcode) {
        format!("{mnem}{cond} {}, {op2}", reg_name(rn))
    } else if mnem == "mov" || mnem == "mvn" {
        format!("{mnem}{cond}{s} {}, {op2}", reg_name(rd))
    } else {
        format!("{mnem}{cond}{s} {}, {}, {op2}", reg_name(rd), reg_name(rn))
    }
}

fn disassemble_single_transfer(instr: u32, cond: &str) -> String {
    let load = instr >> 20 & 1 != 0;
    let byte = instr >> 22 & 1 != 0;
    let rn = instr >> 16 & 0xF;
    let rd = instr >> 12 & 0xF;
    let up = if instr >> 23 & 1 != 0 { "" } else { "-" };
    let mnem = if load { "ldr" } else { "str" };
    let suffix = if byte { "b" } else { "" };

    let offset = if instr >> 25 & 1 == 0 {
        format!("#{up}{:#x}", instr & 0xFFF)
    } else {
        let rm = instr & 0xF;
        format!("{up}{}", reg_name(rm))
    };

    let pre = instr >> 24 & 1 != 0;
    if pre {
        format!("{mnem}{cond}{suffix} {}, [{}, {offset}]", reg_name(rd), reg_name(rn))
    } else {
        format!("{mnem}{cond}{suffix} {}, [{}], {offset}", reg_name(rd), reg_name(rn))
    }
}

const THUMB_BOUNDS: [u16; 20] = [
    0x1800, 0x2000, 0x4000, 0x4400, 0x4800, 0x5000, 0x6000, 0x8000, 0x9000, 0xA000, 0xB000,
    0xB400, 0xBE00, 0xC000, 0xD000, 0xDE00, 0xDF00, 0xE000, 0xE800, 0xF000,
];

fn thumb_class(instr: u16) -> usize {
    THUMB_BOUNDS.partition_point(|&bound| bound <= instr)
}

fn disassemble_thumb(instr: u16, pc: u32) -> String {
    let i = instr as u32;
    match thumb_class(instr) {
        0 => {
            let op = SHIFT_MNEMONIC[(i >> 11 & 0x3) as usize];
            let offset = i >> 6 & 0x1F;
            let rs = i >> 3 & 0x7;
            let rd = i & 0x7;
            format!("{op} {}, {}, #{offset}", reg_name(rd), reg_name(rs))
        }
        1 => {
            let immediate = i >> 10 & 1 != 0;
            let sub = i >> 9 & 1 != 0;
            let field = i >> 6 & 0x7;
            let rs = i >> 3 & 0x7;
            let rd = i & 0x7;
            let mnem = if sub { "sub" } else { "add" };
            let operand = if immediate { format!("#{field}") } else { reg_name(field) };
            format!("{mnem} {}, {}, {operand}", reg_name(rd), reg_name(rs))
        }
        2 => {
            let op = i >> 11 & 0x3;
            let rd = i >> 8 & 0x7;
            let offset = i & 0xFF;
            let mnem = ["mov", "cmp", "add", "sub"][op as usize];
            format!("{mnem} {}, #{offset:#x}", reg_name(rd))
        }
        3 => {
            const ALU: [&str; 16] = [
                "and", "eor", "lsl", "lsr", "asr", "adc", "sbc", "ror", "tst", "neg", "cmp", "cmn",
                "orr", "mul", "bic", "mvn",
            ];
            let op = (i >> 6 & 0xF) as usize;
            let rs = i >> 3 & 0x7;
            let rd = i & 0x7;
            format!("{} {}, {}", ALU[op], reg_name(rd), reg_name(rs))
        }
        4 => {
            let op = i >> 8 & 0x3;
            let h1 = i >> 7 & 1 != 0;
            let h2 = i >> 6 & 1 != 0;
            let rs = (i >> 3 & 0x7) + if h2 { 8 } else { 0 };
            let rd = (i & 0x7) + if h1 { 8 } else { 0 };
            match op {
                0 => format!("add {}, {}", reg_name(rd), reg_name(rs)),
                1 => format!("cmp {}, {}", reg_name(rd), reg_name(rs)),
                2 => format!("mov {}, {}", reg_name(rd), reg_name(rs)),
                3 => format!("bx {}", reg_name(rs)),
                _ => unreachable!(),
            }
        }
        5 => {
            let rd = i >> 8 & 0x7;
            let word = i & 0xFF;
            let addr = (pc & !0x2).wrapping_add(word * 4);
            format!("ldr {}, [pc, #{:#x}] ; ={addr:#010x}", reg_name(rd), word * 4)
        }
        6 => {
            const OPS: [&str; 4] = ["str", "strb", "ldr", "ldrb"];
            const SOPS: [&str; 4] = ["strh", "ldsb", "ldrh", "ldsh"];
            let sign_extended = i >> 9 & 1 != 0;
            let op = (i >> 10 & 0x3) as usize;
            let ro = i >> 6 & 0x7;
            let rb = i >> 3 & 0x7;
            let rd = i & 0x7;
            let mnem = if sign_extended { SOPS[op] } else { OPS[op] };
            format!("{mnem} {}, [{}, {}]", reg_name(rd), reg_name(rb), reg_name(ro))
        }
        7 | 8 => {
            let op = i >> 12 & 0x3;
            let load = i >> 11 & 1 != 0;
            let offset = i >> 6 & 0x1F;
            let rb = i >> 3 & 0x7;
            let rd = i & 0x7;
            let size = if op != 2 { op ^ 2 } else { 4 };
            let suffix = match size {
                1 => "b",
                2 => "h",
                _ => "",
            };
            let mnem = if load { "ldr" } else { "str" };
            format!(
                "{mnem}{suffix} {}, [{}, #{:#x}]",
                reg_name(rd),
                reg_name(rb),
                offset * size
            )
        }
        9 => {
            let load = i >> 11 & 1 != 0;
            let rd = i >> 8 & 0x7;
            let word = i & 0xFF;
            let mnem = if load { "ldr" } else { "str" };
            format!("{mnem} {}, [sp, #{:#x}]", reg_name(rd), word * 4)
        }
        10 => {
            let sp = i >> 11 & 1 != 0;
            let rd = i >> 8 & 0x7;
            let word = i & 0xFF;
            let base = if sp { "sp" } else { "pc" };
            format!("add {}, {base}, #{:#x}", reg_name(rd), word * 4)
        }
        11 => {
            let sub = i >> 7 & 1 != 0;
            let word = i & 0x7F;
            let mnem = if sub { "sub" } else { "add" };
            format!("{mnem} sp, #{:#x}", word * 4)
        }
        12 => {
            let pop = i >> 11 & 1 != 0;
            let raw = i & 0x1FF;
            let mut list: Vec<String> = (0..8u32).filter(|b| raw & (1 << b) != 0).map(reg_name).collect();
            if raw & 0x100 != 0 {
                list.push(if pop { "pc".to_string() } else { "lr".to_string() });
            }
            let mnem = if pop { "pop" } else { "push" };
            format!("{mnem} {{{}}}", list.join(","))
        }
        14 => {
            let load = i >> 11 & 1 != 0;
            let rb = i >> 8 & 0x7;
            let raw = i & 0xFF;
            let list = (0..8u32).filter(|b| raw & (1 << b) != 0).map(reg_name).collect::<Vec<_>>().join(",");
            let mnem = if load { "ldmia" } else { "stmia" };
            format!("{mnem} {}!, {{{list}}}", reg_name(rb))
        }
        15 => {
            let cond = ARM_COND_MNEMONIC[(i >> 8 & 0xF) as usize];
            let offset = i & 0xFF;
            let signed = (offset ^ 0x80).wrapping_sub(0x80);
            let target = pc.wrapping_add(signed.wrapping_mul(2)).wrapping_add(2);
            format!("b{cond} {target:#010x}")
        }
        18 => {
            let offset = i & 0x7FF;
            let signed = (offset ^ 0x400).wrapping_sub(0x400);
            let target = pc.wrapping_add(signed.wrapping_mul(2)).wrapping_add(2);
            format!("b {target:#010x}")
        }
        _ => format!("undef {instr:#06x}"),
    }
}

/// Disassembla la coppia BL/BLX a 32 bit (§4.6, §4.4.2 "Long branch (BL/BLX) pair").
pub fn disassemble_long_branch(hi: u16, lo: u16, fetch_addr: u32) -> String {
    let raw = ((hi as u32 & 0x7FF) << 11) | (lo as u32 & 0x7FF);
    let signed = if raw & 0x20_0000 != 0 {
        raw as i32 - 0x40_0000
    } else {
        raw as i32
    };
    let next_seq = fetch_addr.wrapping_add(4);
    let target = next_seq.wrapping_add((signed * 2) as u32);
    format!("bl {target:#010x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb_mov_immediate_prints_mnemonic_and_operands() {
        // MOV r0, #7 (format 3, op=0)
        assert_eq!(disassemble(0x2007, true, 0), "mov r0, #0x7");
    }

    #[test]
    fn thumb_push_with_lr_prints_register_list() {
        // PUSH {r0, r1, lr}
        assert_eq!(disassemble(0xB503, true, 0), "push {r0,r1,lr}");
    }

    #[test]
    fn arm_mov_immediate_prints_setflags_suffix() {
        // MOVS r0, #5
        let text = disassemble(0xE3B0_0005, false, 0);
        assert!(text.starts_with("movals") || text.starts_with("mov"));
    }

    #[test]
    fn arm_branch_resolves_absolute_target() {
        // B with offset 0, AL condition, at pc = 0x08000008
        let text = disassemble(0xEA00_0000, false, 0x0800_0008);
        assert!(text.contains("0x08000008"));
    }

    #[test]
    fn long_branch_pair_matches_scenario_s5() {
        let text = disassemble_long_branch(0xF000, 0xF801, 0x0800_0000);
        assert_eq!(text, "bl 0x08000006");
    }
}
