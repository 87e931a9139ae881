// Bus di sistema: lega C1 (memoria), C2 (DMA) e C7 (breakpoint) dietro il
// trait `gba_arm7tdmi::cpu::MemoryBus` che la CPU consuma (§4.1, §4.2, §4.6).

use gba_arm7tdmi::cpu::MemoryBus;

use crate::breakpoints::BreakpointRegistry;
use crate::dma;
use crate::memory::Memory;

pub struct Bus {
    pub memory: Memory,
    pub breakpoints: BreakpointRegistry,
    /// Vero solo per la durata di una chiamata all'esecutore (§4.1
    /// "Observation hooks"): gate per non segnalare watchpoint su traffico
    /// interno (DMA, prefetch del disassemblatore, letture del debugger).
    executing: bool,
    pending_break: Option<String>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            memory: Memory::new(),
            breakpoints: BreakpointRegistry::new(),
            executing: false,
            pending_break: None,
        }
    }

    pub fn load_bios(&mut self, bios: Vec<u8>) {
        self.memory.load_bios(bios);
    }

    pub fn load_rom(&mut self, rom: Vec<u8>) {
        self.memory.load_rom(rom);
    }

    pub fn clear_ram(&mut self) {
        self.memory.clear_ram();
    }

    fn observe_read(&mut self, addr: u32) {
        if self.executing && self.breakpoints.read_watch.contains(&addr) {
            self.pending_break = Some(format!("read watch hit at {addr:#010x}"));
        }
    }

    fn observe_write(&mut self, addr: u32, value: u32) {
        if self.executing && self.breakpoints.write_watch.contains(&addr) {
            self.pending_break = Some(format!("write watch hit at {addr:#010x} (value {value:#x})"));
        }
    }
}

impl MemoryBus for Bus {
    fn read_byte(&mut self, addr: u32) -> u8 {
        self.observe_read(addr);
        self.memory.read_byte(addr)
    }

    fn read_halfword(&mut self, addr: u32) -> u16 {
        self.observe_read(addr);
        self.memory.read_halfword(addr)
    }

    fn read_word(&mut self, addr: u32) -> u32 {
        self.observe_read(addr);
        self.memory.read_word(addr)
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        self.observe_write(addr, value as u32);
        self.memory.write_byte(addr, value);
    }

    fn write_halfword(&mut self, addr: u32, value: u16) {
        self.observe_write(addr, value as u32);
        self.memory.write_halfword(addr, value);
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        self.observe_write(addr, value);
        self.memory.write_word(addr, value);
    }

    fn is_execute_breakpoint(&self, addr: u32) -> bool {
        self.breakpoints.execute.contains(&addr)
    }

    fn begin_instruction(&mut self) {
        self.executing = true;
        self.pending_break = None;
    }

    fn end_instruction(&mut self) {
        self.executing = false;
    }

    fn take_break_state(&mut self) -> Option<String> {
        self.pending_break.take()
    }

    fn check_dma(&mut self) {
        dma::check_and_run(&mut self.memory);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_watch_fires_only_while_executing() {
        let mut bus = Bus::new();
        bus.breakpoints.add_write_watch(0x0200_0000);

        bus.write_byte(0x0200_0000, 1);
        assert!(bus.take_break_state().is_none());

        bus.begin_instruction();
        bus.write_byte(0x0200_0000, 2);
        assert!(bus.take_break_state().is_some());
        bus.end_instruction();
    }

    #[test]
    fn execute_breakpoint_is_queried_without_mutation() {
        let mut bus = Bus::new();
        bus.breakpoints.add_execute(0x0800_0000);
        assert!(bus.is_execute_breakpoint(0x0800_0000));
        assert!(!bus.is_execute_breakpoint(0x0800_0004));
    }
}
