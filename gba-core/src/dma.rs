// Motore DMA (C2, §4.2).
//
// Un solo canale fisso, indirizzato dagli offset fissi 0xD4/0xD8/0xDC/0xDE
// della regione I/O. Si attiva dopo che un'istruzione si è ritirata, se il
// bit alto del registro di controllo è impostato.

use crate::memory::Memory;

pub const SRC_OFFSET: u32 = 0x04000_0D4;
pub const DST_OFFSET: u32 = 0x04000_0D8;
pub const COUNT_OFFSET: u32 = 0x04000_0DC;
pub const CONTROL_OFFSET: u32 = 0x04000_0DE;

/// Controlla il bit di armamento del canale e, se impostato, esegue il
/// trasferimento e ripulisce il bit. Va invocato incondizionatamente dopo
/// ogni istruzione ritirata (§4.6 passo 6).
pub fn check_and_run(memory: &mut Memory) {
    let control = memory.read_halfword(CONTROL_OFFSET);
    if control & 0x8000 == 0 {
        return;
    }

    let src = memory.read_word(SRC_OFFSET);
    let dst = memory.read_word(DST_OFFSET);
    let count = memory.read_halfword(COUNT_OFFSET) as u32;
    let unit = 2 + 2 * ((control >> 10) & 1) as u32;

    log::debug!(
        "DMA: src={src:#010x} dst={dst:#010x} count={count} unit={unit}"
    );
    memory.copy(src, dst, count * unit);

    memory.write_halfword(CONTROL_OFFSET, control & 0x7FFF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armed_channel_copies_and_clears_control_high_bit() {
        let mut mem = Memory::new();
        mem.write_byte(0x0200_0000, 0xAB);
        mem.write_byte(0x0200_0001, 0xCD);
        mem.write_word(SRC_OFFSET, 0x0200_0000);
        mem.write_word(DST_OFFSET, 0x0300_0000);
        mem.write_halfword(COUNT_OFFSET, 1);
        mem.write_halfword(CONTROL_OFFSET, 0x8400); // armed, word transfer

        check_and_run(&mut mem);

        assert_eq!(mem.read_byte(0x0300_0000), 0xAB);
        assert_eq!(mem.read_byte(0x0300_0001), 0xCD);
        assert_eq!(mem.read_halfword(CONTROL_OFFSET), 0x0400);
    }

    #[test]
    fn disarmed_channel_does_nothing() {
        let mut mem = Memory::new();
        mem.write_word(SRC_OFFSET, 0x0200_0000);
        mem.write_word(DST_OFFSET, 0x0300_0000);
        mem.write_halfword(COUNT_OFFSET, 4);
        mem.write_halfword(CONTROL_OFFSET, 0x0400);
        check_and_run(&mut mem);
        assert_eq!(mem.read_byte(0x0300_0000), 0);
    }
}
