use crate::arm;
use crate::registers::Registers;
use crate::thumb;

// Bus di memoria visto dalla CPU (§4.1/C1).
//
// La CPU non conosce la mappa di memoria concreta: dipende solo da questo
// trait. L'implementazione reale (gba-core::Memory) vi aggiunge region
// dispatch, mirroring e osservazione di breakpoint; qui i metodi di
// breakpoint/DMA hanno un default no-op così che un bus minimale (usato nei
// test) non debba implementarli.
pub trait MemoryBus {
    fn read_byte(&mut self, addr: u32) -> u8;
    fn read_halfword(&mut self, addr: u32) -> u16;
    fn read_word(&mut self, addr: u32) -> u32;

    fn read_byte_signed(&mut self, addr: u32) -> u32 {
        let v = self.read_byte(addr) as u32;
        ((v ^ 0x80) as i32 - 0x80) as u32
    }

    fn read_halfword_signed(&mut self, addr: u32) -> u32 {
        let v = self.read_halfword(addr) as u32;
        ((v ^ 0x8000) as i32 - 0x8000) as u32
    }

    fn write_byte(&mut self, addr: u32, value: u8);
    fn write_halfword(&mut self, addr: u32, value: u16);
    fn write_word(&mut self, addr: u32, value: u32);

    /// True se `addr` è nell'insieme dei breakpoint di esecuzione (C7).
    fn is_execute_breakpoint(&self, _addr: u32) -> bool {
        false
    }

    /// Marca l'inizio/fine di un ciclo fetch-execute, per gating read/write
    /// watchpoints sulle letture innescate dall'esecutore (non dal debugger).
    fn begin_instruction(&mut self) {}
    fn end_instruction(&mut self) {}

    /// Preleva (e consuma) lo stato di break registrato durante l'ultima
    /// istruzione da un read/write watchpoint, se presente.
    fn take_break_state(&mut self) -> Option<String> {
        None
    }

    /// Controllo DMA post-ritiro istruzione (C2): eseguito incondizionatamente
    /// dopo ogni istruzione, il bus decide se il canale è armato.
    fn check_dma(&mut self) {}
}

/// Esito di un singolo passo fetch/execute/retire.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Indirizzo dell'istruzione appena ritirata.
    pub retired_pc: u32,
    /// Se un breakpoint di esecuzione ha fermato il dispatch prima che
    /// l'istruzione venisse eseguita.
    pub execute_break: bool,
    /// Messaggio di break prodotto da un read/write watchpoint durante
    /// l'esecuzione, se presente.
    pub break_state: Option<String>,
}

/// CPU ARM7TDMI: set di registri piatto più il driver fetch/execute/retire.
///
/// Niente pipeline, niente timing di ciclo: ogni chiamata a `step` esegue
/// esattamente un'istruzione e applica gli effetti collaterali del bus (DMA,
/// breakpoint) nell'ordine descritto dal contratto del driver.
pub struct ARM7TDMI {
    pub regs: Registers,
    pub halted: bool,
}

impl ARM7TDMI {
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            halted: false,
        }
    }

    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.halted = false;
    }

    /// Esegue un'istruzione: fetch, check breakpoint, dispatch, DMA, retire.
    ///
    /// Il registro r15 è tenuto, tra un `step` e l'altro, un `size` avanti
    /// rispetto all'istruzione che sta per essere prelevata (§4.6 step 1):
    /// l'indirizzo di fetch si ottiene sottraendo `size` e allineando. Prima
    /// di dispatciare all'esecutore, r15 viene avanzato di un altro `size`
    /// così che l'istruzione veda il PC "due istruzioni avanti" come da
    /// comportamento hardware reale (branch e link possono quindi sommare il
    /// resto dell'offset di pipeline con una semplice addizione). I
    /// breakpoint di esecuzione sono controllati sull'indirizzo di fetch,
    /// non su quello post-avanzamento.
    pub fn step<M: MemoryBus>(&mut self, bus: &mut M) -> StepOutcome {
        let thumb_mode = self.regs.is_thumb();
        let size: u32 = if thumb_mode { 2 } else { 4 };
        let addr = self.regs.pc().wrapping_sub(size) & !(size - 1);

        if bus.is_execute_breakpoint(addr) {
            return StepOutcome {
                retired_pc: addr,
                execute_break: true,
                break_state: None,
            };
        }

        bus.begin_instruction();

        if thumb_mode {
            self.step_thumb(bus, addr);
        } else {
            self.step_arm(bus, addr);
        }

        bus.check_dma();
        let break_state = bus.take_break_state();
        bus.end_instruction();

        StepOutcome {
            retired_pc: addr,
            execute_break: false,
            break_state,
        }
    }

    fn step_arm<M: MemoryBus>(&mut self, bus: &mut M, addr: u32) {
        let instr = bus.read_word(addr);
        self.regs.set_pc(addr.wrapping_add(8));

        let cond = crate::condition::Condition::from_bits(instr >> 28);
        if cond.check(self.regs.cpsr) {
            arm::execute(instr, &mut self.regs, bus);
        }
    }

    fn step_thumb<M: MemoryBus>(&mut self, bus: &mut M, addr: u32) {
        let half = bus.read_halfword(addr);

        // Coppia lunga BL/BLX (§4.6): il primo halfword ha i 5 bit alti
        // 0b11110. Le due metà vengono trattate come un'unica istruzione a
        // 32 bit invece di eseguire la semantica (errata) a due passi
        // dell'originale.
        if half & 0xF800 == 0xF000 {
            let low = bus.read_halfword(addr.wrapping_add(2));
            thumb::execute_long_branch(half, low, &mut self.regs, addr);
            return;
        }

        self.regs.set_pc(addr.wrapping_add(4));
        thumb::execute(half, &mut self.regs, bus);
    }
}

impl Default for ARM7TDMI {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct DummyBus {
        mem: std::collections::HashMap<u32, u8>,
    }

    impl DummyBus {
        fn set_word(&mut self, addr: u32, value: u32) {
            for i in 0..4 {
                self.mem.insert(addr + i, (value >> (8 * i)) as u8);
            }
        }
        fn set_halfword(&mut self, addr: u32, value: u16) {
            self.mem.insert(addr, value as u8);
            self.mem.insert(addr + 1, (value >> 8) as u8);
        }
    }

    impl MemoryBus for DummyBus {
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
    fn reset_clears_registers_and_halt() {
        let mut cpu = ARM7TDMI::new();
        cpu.regs.set_pc(0x1234);
        cpu.halted = true;
        cpu.reset();
        assert_eq!(cpu.regs.pc(), 0);
        assert!(!cpu.halted);
    }

    #[test]
    fn arm_mov_immediate_advances_pc_and_sets_register() {
        let mut cpu = ARM7TDMI::new();
        let mut bus = DummyBus::default();
        // MOV R0, #5 ; AL condition, opcode MOV=0b1101, S=0, at 0x1000.
        // r15 è tenuto `size` (4) avanti all'istruzione da prelevare.
        cpu.regs.set_pc(0x1004);
        bus.set_word(0x1000, 0xE3A0_0005);
        let outcome = cpu.step(&mut bus);
        assert!(!outcome.execute_break);
        assert_eq!(outcome.retired_pc, 0x1000);
        assert_eq!(cpu.regs.r[0], 5);
        // non tocca r15: resta due istruzioni avanti (0x1000 + 2*4).
        assert_eq!(cpu.regs.pc(), 0x1008);
    }

    #[test]
    fn thumb_mov_immediate_advances_pc_by_two() {
        let mut cpu = ARM7TDMI::new();
        cpu.regs.set_thumb(true);
        cpu.regs.set_pc(0x2002); // size (2) avanti all'istruzione a 0x2000
        let mut bus = DummyBus::default();
        // MOV R0, #7 (format 3, Op=0)
        bus.set_halfword(0x2000, 0x2007);
        let outcome = cpu.step(&mut bus);
        assert_eq!(outcome.retired_pc, 0x2000);
        assert_eq!(cpu.regs.r[0], 7);
        assert_eq!(cpu.regs.pc(), 0x2004);
    }

    #[test]
    fn execute_breakpoint_stops_before_dispatch() {
        let mut cpu = ARM7TDMI::new();
        struct BreakingBus(DummyBus);
        impl MemoryBus for BreakingBus {
            fn read_byte(&mut self, addr: u32) -> u8 {
                self.0.read_byte(addr)
            }
            fn read_halfword(&mut self, addr: u32) -> u16 {
                self.0.read_halfword(addr)
            }
            fn read_word(&mut self, addr: u32) -> u32 {
                self.0.read_word(addr)
            }
            fn write_byte(&mut self, addr: u32, value: u8) {
                self.0.write_byte(addr, value)
            }
            fn write_halfword(&mut self, addr: u32, value: u16) {
                self.0.write_halfword(addr, value)
            }
            fn write_word(&mut self, addr: u32, value: u32) {
                self.0.write_word(addr, value)
            }
            fn is_execute_breakpoint(&self, addr: u32) -> bool {
                addr == 0x1000
            }
        }
        let mut bus = BreakingBus(DummyBus::default());
        cpu.regs.set_pc(0x1004);
        bus.0.set_word(0x1000, 0xE3A0_0005);
        let outcome = cpu.step(&mut bus);
        assert!(outcome.execute_break);
        assert_eq!(outcome.retired_pc, 0x1000);
        assert_eq!(cpu.regs.r[0], 0); // never dispatched
        assert_eq!(cpu.regs.pc(), 0x1004); // r15 untouched, breakpoint re-fires next step
    }
}
