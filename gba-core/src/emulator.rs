// Aggregato GbaEmulator: unico proprietario di CPU e bus (§9 "Global mutable
// state" -- evita i due moduli globali che devono restare sincronizzati
// dell'originale). Il driver fetch/execute/retire vive in
// `gba_arm7tdmi::cpu::ARM7TDMI::step`; qui restano solo il ciclo di vita
// ROM/BIOS/reset e l'inoltro di un singolo passo alla CPU (§6.2 "reset", §3
// "Lifecycles").

use gba_arm7tdmi::cpu::StepOutcome;
use gba_arm7tdmi::ARM7TDMI;

use crate::bus::Bus;
use crate::cartridge::Cartridge;

/// Stato iniziale dei registri al reset (§6.2): r0..r15 tranne r1/r13/r15
/// restano a zero. CPSR = 0x6000001F (modalità utente, IRQ/FIQ mascherati,
/// modo ARM) -- FIQ/IRQ non sono modellati oltre questo valore letterale.
pub const INITIAL_REGS: [u32; 16] = [
    0x0800_0000,
    0x0000_00EA,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    0x0300_7F00,
    0,
    0x0800_0004,
];
pub const INITIAL_CPSR: u32 = 0x6000_001F;

pub struct GbaEmulator {
    pub cpu: ARM7TDMI,
    pub bus: Bus,
}

impl GbaEmulator {
    pub fn new() -> Self {
        let mut emu = Self {
            cpu: ARM7TDMI::new(),
            bus: Bus::new(),
        };
        emu.reset();
        emu
    }

    pub fn load_bios(&mut self, bios: Vec<u8>) {
        log::info!("Loading BIOS ({} bytes)", bios.len());
        self.bus.load_bios(bios);
    }

    /// Carica una cartridge: rimpiazza la regione ROM e riporta CPU/RAM allo
    /// stato iniziale, come un power-on reale (§3 "Lifecycles").
    pub fn load_cartridge(&mut self, cartridge: Cartridge) {
        log::info!("Loading ROM: {}", cartridge.rom_path.display());
        self.load_rom(cartridge.rom);
    }

    pub fn load_rom(&mut self, rom: Vec<u8>) {
        self.bus.load_rom(rom);
        self.reset();
    }

    /// `reset` (§6.2): azzera la RAM e ripristina i registri iniziali. La ROM
    /// importata resta intatta.
    pub fn reset(&mut self) {
        self.bus.clear_ram();
        self.cpu.reset();
        self.cpu.regs.r = INITIAL_REGS;
        self.cpu.regs.cpsr = INITIAL_CPSR;
    }

    /// Esegue una singola istruzione fetch/execute/retire (§4.6).
    pub fn step(&mut self) -> StepOutcome {
        self.cpu.step(&mut self.bus)
    }
}

impl Default for GbaEmulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_emulator_has_documented_initial_register_state() {
        let emu = GbaEmulator::new();
        assert_eq!(emu.cpu.regs.r[0], 0x0800_0000);
        assert_eq!(emu.cpu.regs.r[1], 0x0000_00EA);
        assert_eq!(emu.cpu.regs.r[13], 0x0300_7F00);
        assert_eq!(emu.cpu.regs.r[15], 0x0800_0004);
        assert_eq!(emu.cpu.regs.cpsr, 0x6000_001F);
        assert!(!emu.cpu.regs.is_thumb());
    }

    #[test]
    fn reset_zeroes_ram_but_keeps_loaded_rom() {
        let mut emu = GbaEmulator::new();
        emu.load_rom(vec![0xAA, 0xBB, 0xCC, 0xDD]);
        emu.bus.memory.write_byte(0x0200_0000, 0x42);
        emu.cpu.regs.r[2] = 0xDEAD;

        emu.reset();

        assert_eq!(emu.bus.memory.read_byte(0x0200_0000), 0);
        assert_eq!(emu.bus.memory.read_word(0x0800_0000), 0xDDCC_BBAA);
        assert_eq!(emu.cpu.regs.r[2], 0);
        assert_eq!(emu.cpu.regs.r[15], 0x0800_0004);
    }

    #[test]
    fn load_rom_resets_registers_to_initial_state() {
        let mut emu = GbaEmulator::new();
        emu.cpu.regs.r[0] = 0x1234;
        emu.load_rom(vec![1, 2, 3, 4]);
        assert_eq!(emu.cpu.regs.r[0], 0x0800_0000);
    }
}
