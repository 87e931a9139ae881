use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// Registro set dell'ARM7TDMI (§3 del modello dati).
//
// Niente banking: r8-r14 non cambiano al variare della modalità, e non esiste
// un SPSR separato. Il processore è sempre trattato come se girasse in un
// unico set di registri visibili; privilegi e interrupt non sono modellati.

/// Stato di esecuzione (set di istruzioni attivo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    ARM,
    THUMB,
}

bitflags! {
    /// Bit di stato rilevanti del CPSR. Solo N, Z, C, V e T sono modellati;
    /// i bit di modalità e le maschere di interrupt non esistono in questo registro.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct StatusFlags: u32 {
        const NEGATIVE    = 1 << 31; // N
        const ZERO        = 1 << 30; // Z
        const CARRY       = 1 << 29; // C
        const OVERFLOW    = 1 << 28; // V
        const THUMB_STATE = 1 << 5;  // T
    }
}

/// Banco piatto di 17 parole: r0..r15 più CPSR. Nessun banking per modalità.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registers {
    pub r: [u32; 16],
    pub cpsr: u32,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            cpsr: 0,
        }
    }

    #[inline(always)]
    pub fn pc(&self) -> u32 {
        self.r[15]
    }

    #[inline(always)]
    pub fn set_pc(&mut self, value: u32) {
        self.r[15] = value;
    }

    #[inline(always)]
    pub fn sp(&self) -> u32 {
        self.r[13]
    }

    #[inline(always)]
    pub fn set_sp(&mut self, value: u32) {
        self.r[13] = value;
    }

    #[inline(always)]
    pub fn lr(&self) -> u32 {
        self.r[14]
    }

    #[inline(always)]
    pub fn set_lr(&mut self, value: u32) {
        self.r[14] = value;
    }

    #[inline(always)]
    pub fn is_thumb(&self) -> bool {
        self.cpsr & StatusFlags::THUMB_STATE.bits() != 0
    }

    #[inline(always)]
    pub fn set_thumb(&mut self, thumb: bool) {
        if thumb {
            self.cpsr |= StatusFlags::THUMB_STATE.bits();
        } else {
            self.cpsr &= !StatusFlags::THUMB_STATE.bits();
        }
    }

    #[inline(always)]
    pub fn cpu_state(&self) -> CpuState {
        if self.is_thumb() {
            CpuState::THUMB
        } else {
            CpuState::ARM
        }
    }

    #[inline(always)]
    pub fn flag_n(&self) -> bool {
        self.cpsr & StatusFlags::NEGATIVE.bits() != 0
    }

    #[inline(always)]
    pub fn set_flag_n(&mut self, value: bool) {
        if value {
            self.cpsr |= StatusFlags::NEGATIVE.bits();
        } else {
            self.cpsr &= !StatusFlags::NEGATIVE.bits();
        }
    }

    #[inline(always)]
    pub fn flag_z(&self) -> bool {
        self.cpsr & StatusFlags::ZERO.bits() != 0
    }

    #[inline(always)]
    pub fn set_flag_z(&mut self, value: bool) {
        if value {
            self.cpsr |= StatusFlags::ZERO.bits();
        } else {
            self.cpsr &= !StatusFlags::ZERO.bits();
        }
    }

    #[inline(always)]
    pub fn flag_c(&self) -> bool {
        self.cpsr & StatusFlags::CARRY.bits() != 0
    }

    #[inline(always)]
    pub fn set_flag_c(&mut self, value: bool) {
        if value {
            self.cpsr |= StatusFlags::CARRY.bits();
        } else {
            self.cpsr &= !StatusFlags::CARRY.bits();
        }
    }

    #[inline(always)]
    pub fn flag_v(&self) -> bool {
        self.cpsr & StatusFlags::OVERFLOW.bits() != 0
    }

    #[inline(always)]
    pub fn set_flag_v(&mut self, value: bool) {
        if value {
            self.cpsr |= StatusFlags::OVERFLOW.bits();
        } else {
            self.cpsr &= !StatusFlags::OVERFLOW.bits();
        }
    }

    #[inline(always)]
    pub fn set_flags(&mut self, n: bool, z: bool, c: bool, v: bool) {
        let mut flags = self.cpsr & 0x0FFF_FFFF;
        if n {
            flags |= StatusFlags::NEGATIVE.bits();
        }
        if z {
            flags |= StatusFlags::ZERO.bits();
        }
        if c {
            flags |= StatusFlags::CARRY.bits();
        }
        if v {
            flags |= StatusFlags::OVERFLOW.bits();
        }
        self.cpsr = flags;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb_bit_roundtrips_through_cpsr() {
        let mut r = Registers::new();
        assert!(!r.is_thumb());
        r.set_thumb(true);
        assert!(r.is_thumb());
        assert_eq!(r.cpu_state(), CpuState::THUMB);
        r.set_thumb(false);
        assert!(!r.is_thumb());
        assert_eq!(r.cpu_state(), CpuState::ARM);
    }

    #[test]
    fn set_flags_only_touches_top_nibble() {
        let mut r = Registers::new();
        r.set_thumb(true);
        r.set_flags(true, false, true, false);
        assert!(r.flag_n());
        assert!(!r.flag_z());
        assert!(r.flag_c());
        assert!(!r.flag_v());
        // T bit survives a flags write.
        assert!(r.is_thumb());
    }

    #[test]
    fn pc_sp_lr_accessors_index_correct_registers() {
        let mut r = Registers::new();
        r.set_pc(0x0800_0000);
        r.set_sp(0x0300_7F00);
        r.set_lr(0x0800_0004);
        assert_eq!(r.r[15], 0x0800_0000);
        assert_eq!(r.r[13], 0x0300_7F00);
        assert_eq!(r.r[14], 0x0800_0004);
        assert_eq!(r.pc(), 0x0800_0000);
        assert_eq!(r.sp(), 0x0300_7F00);
        assert_eq!(r.lr(), 0x0800_0004);
    }
}
