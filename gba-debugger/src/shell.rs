// Shell di debug a comandi (§6.2): loop leggi-dispaccia-stampa sopra
// `GbaEmulator`. Grounded su `Components/Debugger.py`'s main loop -- stessa
// tavola di comandi, stessa idea di snapshot con nome in `LocalSaves`
// (qui `HashMap<String, Snapshot>`) -- ma con un enum di errore tipizzato
// al posto di eccezioni Python generiche e la grammatica di espressioni di
// `crate::expr` al posto di `eval()` per gli indirizzi e le condizioni.

use std::collections::HashMap;
use std::io::Write;

use thiserror::Error;

use gba_core::emulator::{GbaEmulator, INITIAL_CPSR, INITIAL_REGS};
use gba_core::savestate::{self, Snapshot, SavestateError};

use crate::assemble::{self, AssembleError};
use crate::disasm;
use crate::expr::{self, ExprError};
use crate::funcflow;

const DEFAULT_SNAPSHOT_NAME: &str = "PRIORSTATE";

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("no ROM loaded")]
    NoRomLoaded,
    #[error("invalid expression: {0}")]
    Expr(#[from] ExprError),
    #[error("assembler error: {0}")]
    Assemble(#[from] AssembleError),
    #[error("savestate error: {0}")]
    Savestate(#[from] SavestateError),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no snapshot named '{0}'")]
    UnknownSnapshot(String),
    #[error("breakpoint index {0} out of range")]
    BadBreakpointIndex(usize),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Stato della shell oltre all'emulatore: se una ROM è stata caricata (il
/// `continue` senza ROM è un errore di shell, non del core, §7), e gli
/// snapshot in-memoria con nome.
pub struct Shell {
    pub emulator: GbaEmulator,
    rom_loaded: bool,
    snapshots: HashMap<String, Snapshot>,
}

impl Shell {
    pub fn new(emulator: GbaEmulator, rom_loaded: bool) -> Self {
        Self {
            emulator,
            rom_loaded,
            snapshots: HashMap::new(),
        }
    }

    /// Esegue il loop leggi-dispaccia-stampa su `stdin`/`stdout` finché
    /// l'input non finisce o il comando `quit`/`exit` viene dato.
    pub fn run_repl<R: std::io::BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> std::io::Result<()> {
        loop {
            write!(out, "(gba) ")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "quit" || line == "exit" {
                break;
            }
            match self.dispatch(line) {
                Ok(message) => {
                    if !message.is_empty() {
                        writeln!(out, "{message}")?;
                    }
                }
                Err(e) => writeln!(out, "error: {e}")?,
            }
        }
        Ok(())
    }

    /// Dispaccia una singola riga di comando, ritornando il testo da
    /// mostrare al prompt. Non scrive mai direttamente su stdout: questo
    /// mantiene la shell testabile senza un terminale.
    pub fn dispatch(&mut self, line: &str) -> Result<String, ShellError> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();

        match cmd {
            "n" => self.step(parse_count(&rest, 1)?),
            "c" => self.cont(parse_count(&rest, 0)?),
            "b" => self.add_execute(&rest),
            "bw" => self.add_write_watch(&rest),
            "br" => self.add_read_watch(&rest),
            "bc" => self.add_condition(&rest),
            "d" => self.remove_execute(&rest),
            "dw" => self.remove_write_watch(&rest),
            "dr" => self.remove_read_watch(&rest),
            "dc" => self.remove_condition(&rest),
            "i" => Ok(self.show_registers()),
            "m" => self.dump_memory(&rest),
            "dist" => self.disassemble(&rest, true),
            "disa" => self.disassemble(&rest, false),
            "funcbounds" => self.function_bounds(&rest),
            "asm" => self.assemble_line(&rest, line),
            "importrom" => self.import_rom(&rest),
            "importstate" => self.import_state(&rest),
            "exportstate" => self.export_state(&rest),
            "exportrom" => self.export_rom(&rest),
            "save" => self.save_snapshot(&rest),
            "load" => self.load_snapshot(&rest),
            "ds" => self.delete_snapshot(&rest),
            "reset" => self.reset(),
            _ => Err(ShellError::Usage("unknown command")),
        }
    }

    fn step(&mut self, count: u32) -> Result<String, ShellError> {
        self.require_rom()?;
        for _ in 0..count.max(1) {
            let outcome = self.emulator.step();
            if let Some(msg) = &outcome.break_state {
                return Ok(format!("{msg}\n{}", self.show_registers()));
            }
            if outcome.execute_break {
                return Ok(format!("execute breakpoint at {:#010x}\n{}", outcome.retired_pc, self.show_registers()));
            }
        }
        Ok(self.show_registers())
    }

    fn cont(&mut self, count: u32) -> Result<String, ShellError> {
        self.require_rom()?;
        let mut remaining = count;
        loop {
            let outcome = self.emulator.step();
            if outcome.execute_break {
                return Ok(format!("execute breakpoint at {:#010x}\n{}", outcome.retired_pc, self.show_registers()));
            }
            if let Some(msg) = &outcome.break_state {
                return Ok(format!("{msg}\n{}", self.show_registers()));
            }
            if self
                .emulator
                .bus
                .breakpoints
                .any_condition_met(&self.emulator.cpu.regs, &mut self.emulator.bus.memory)
            {
                return Ok(format!("conditional breakpoint hit\n{}", self.show_registers()));
            }
            if count != 0 {
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }
        Ok(self.show_registers())
    }

    fn add_execute(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(args)?;
        self.emulator.bus.breakpoints.add_execute(addr);
        Ok(format!("execute breakpoint set at {addr:#010x}"))
    }

    fn add_write_watch(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(args)?;
        self.emulator.bus.breakpoints.add_write_watch(addr);
        Ok(format!("write watchpoint set at {addr:#010x}"))
    }

    fn add_read_watch(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(args)?;
        self.emulator.bus.breakpoints.add_read_watch(addr);
        Ok(format!("read watchpoint set at {addr:#010x}"))
    }

    fn add_condition(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let text = args.join(" ");
        if text.is_empty() {
            return Err(ShellError::Usage("bc <expr>"));
        }
        let parsed = expr::parse(&text)?;
        let index = self.emulator.bus.breakpoints.conditions.len();
        self.emulator.bus.breakpoints.add_condition(parsed.into_condition());
        Ok(format!("conditional breakpoint #{index} installed: {text}"))
    }

    fn remove_execute(&mut self, args: &[&str]) -> Result<String, ShellError> {
        if args.first() == Some(&"all") {
            self.emulator.bus.breakpoints.clear_all();
            return Ok("all breakpoints cleared".to_string());
        }
        let addr = self.eval_addr(args)?;
        self.emulator.bus.breakpoints.remove_execute(addr);
        Ok(format!("execute breakpoint removed at {addr:#010x}"))
    }

    fn remove_write_watch(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(args)?;
        self.emulator.bus.breakpoints.remove_write_watch(addr);
        Ok(format!("write watchpoint removed at {addr:#010x}"))
    }

    fn remove_read_watch(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(args)?;
        self.emulator.bus.breakpoints.remove_read_watch(addr);
        Ok(format!("read watchpoint removed at {addr:#010x}"))
    }

    fn remove_condition(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let idx: usize = args
            .first()
            .ok_or(ShellError::Usage("dc <index>"))?
            .parse()
            .map_err(|_| ShellError::Usage("dc <index>"))?;
        if !self.emulator.bus.breakpoints.remove_condition(idx) {
            return Err(ShellError::BadBreakpointIndex(idx));
        }
        Ok(format!("conditional breakpoint #{idx} removed"))
    }

    fn show_registers(&self) -> String {
        let regs = &self.emulator.cpu.regs;
        let mut lines = Vec::with_capacity(18);
        for i in 0..16 {
            lines.push(format!("r{i:<2} = {:#010x}", regs.r[i]));
        }
        lines.push(format!(
            "cpsr = {:#010x}  [N={} Z={} C={} V={} T={}]",
            regs.cpsr,
            regs.flag_n() as u8,
            regs.flag_z() as u8,
            regs.flag_c() as u8,
            regs.flag_v() as u8,
            regs.is_thumb() as u8,
        ));
        lines.join("\n")
    }

    fn dump_memory(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(&args[..args.len().min(1)])?;
        let count: u32 = args.get(1).map(|s| parse_int(s)).transpose()?.unwrap_or(16);
        let size: u32 = args.get(2).map(|s| parse_int(s)).transpose()?.unwrap_or(1);
        let mut lines = Vec::new();
        let mut bytes = Vec::new();
        for i in 0..count {
            let a = addr.wrapping_add(i * size);
            let value = self.emulator.bus.memory.read(a, size);
            let hex = match size {
                1 => format!("{value:02x}"),
                2 => format!("{value:04x}"),
                _ => format!("{value:08x}"),
            };
            lines.push(hex);
            for b in 0..size.min(4) {
                bytes.push((value >> (8 * b)) as u8);
            }
        }
        let ascii: String = bytes
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
            .collect();
        Ok(format!("{:#010x}: {}  {}", addr, lines.join(" "), ascii))
    }

    fn disassemble(&mut self, args: &[&str], thumb: bool) -> Result<String, ShellError> {
        let addr = self.eval_addr(&args[..args.len().min(1)])?;
        let count: u32 = args.get(1).map(|s| parse_int(s)).transpose()?.unwrap_or(1);
        let step = if thumb { 2 } else { 4 };
        let mut lines = Vec::new();
        let mut a = addr;
        for _ in 0..count.max(1) {
            let opcode = if thumb {
                self.emulator.bus.memory.read_halfword(a) as u32
            } else {
                self.emulator.bus.memory.read_word(a)
            };
            let pc = a.wrapping_add(step * 2);
            let text = disasm::disassemble(opcode, thumb, pc);
            lines.push(format!("{a:#010x}: {text}"));
            a = a.wrapping_add(step);
        }
        Ok(lines.join("\n"))
    }

    fn function_bounds(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let addr = self.eval_addr(args)?;
        let bounds = funcflow::function_bounds(&self.emulator.bus.memory.rom, addr);
        Ok(format!(
            "function at {:#010x}: end={:#010x}, {} instructions",
            bounds.start, bounds.end, bounds.instruction_count
        ))
    }

    fn assemble_line(&mut self, args: &[&str], raw: &str) -> Result<String, ShellError> {
        let base_pc = args.first().and_then(|s| parse_int(s).ok());
        let text = raw.strip_prefix("asm").unwrap_or(raw).trim();
        let opcode = assemble::assemble(text, base_pc)?;
        Ok(format!("{opcode:#x}"))
    }

    fn import_rom(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let path = args.first().copied().ok_or(ShellError::Usage("importrom <path>"))?;
        let rom = std::fs::read(path)?;
        self.emulator.load_rom(rom);
        self.rom_loaded = true;
        Ok(format!("loaded ROM from {path}"))
    }

    fn import_state(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let path = args.first().copied().ok_or(ShellError::Usage("importstate <path>"))?;
        savestate::load_file(path, &mut self.emulator.bus.memory, &mut self.emulator.cpu.regs)?;
        Ok(format!("loaded savestate from {path}"))
    }

    fn export_state(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let path = args.first().copied().ok_or(ShellError::Usage("exportstate <path>"))?;
        savestate::export_file(path, &self.emulator.bus.memory, &self.emulator.cpu.regs)?;
        Ok(format!("exported savestate to {path}"))
    }

    fn export_rom(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let path = args.first().copied().ok_or(ShellError::Usage("exportrom <path>"))?;
        savestate::export_rom(path, &self.emulator.bus.memory.rom)?;
        Ok(format!("exported ROM to {path}"))
    }

    fn save_snapshot(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let name = args.first().copied().unwrap_or(DEFAULT_SNAPSHOT_NAME);
        let snap = Snapshot::capture(&self.emulator.bus.memory, &self.emulator.cpu.regs);
        self.snapshots.insert(name.to_string(), snap);
        Ok(format!("saved snapshot '{name}'"))
    }

    fn load_snapshot(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let name = args.first().copied().unwrap_or(DEFAULT_SNAPSHOT_NAME);
        let snap = self
            .snapshots
            .get(name)
            .ok_or_else(|| ShellError::UnknownSnapshot(name.to_string()))?;
        snap.restore(&mut self.emulator.bus.memory, &mut self.emulator.cpu.regs);
        Ok(format!("restored snapshot '{name}'"))
    }

    fn delete_snapshot(&mut self, args: &[&str]) -> Result<String, ShellError> {
        let name = args.first().copied().unwrap_or(DEFAULT_SNAPSHOT_NAME);
        if self.snapshots.remove(name).is_none() {
            return Err(ShellError::UnknownSnapshot(name.to_string()));
        }
        Ok(format!("deleted snapshot '{name}'"))
    }

    fn reset(&mut self) -> Result<String, ShellError> {
        self.emulator.reset();
        Ok(format!(
            "reset: r0={:#010x} r15={:#010x} cpsr={:#010x}",
            INITIAL_REGS[0], INITIAL_REGS[15], INITIAL_CPSR
        ))
    }

    fn require_rom(&self) -> Result<(), ShellError> {
        if self.rom_loaded {
            Ok(())
        } else {
            Err(ShellError::NoRomLoaded)
        }
    }

    fn eval_addr(&mut self, args: &[&str]) -> Result<u32, ShellError> {
        if args.is_empty() {
            return Err(ShellError::Usage("expected an address or expression"));
        }
        let text = args.join(" ");
        let parsed = expr::parse(&text)?;
        Ok(parsed.eval(&self.emulator.cpu.regs, &mut self.emulator.bus.memory))
    }
}

fn parse_count(args: &[&str], default: u32) -> Result<u32, ShellError> {
    match args.first() {
        Some(s) => parse_int(s),
        None => Ok(default),
    }
}

fn parse_int(s: &str) -> Result<u32, ShellError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).map_err(|_| ShellError::Usage("expected an integer"))
    } else {
        s.parse::<u32>().map_err(|_| ShellError::Usage("expected an integer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_with_rom(rom: Vec<u8>) -> Shell {
        let mut emulator = GbaEmulator::new();
        emulator.load_rom(rom);
        Shell::new(emulator, true)
    }

    #[test]
    fn step_executes_one_instruction_and_reports_registers() {
        // MOV r0, #5 at 0x08000000, ARM mode.
        let mut rom = vec![0u8; 8];
        rom[0..4].copy_from_slice(&0xE3A0_0005u32.to_le_bytes());
        let mut shell = shell_with_rom(rom);
        let out = shell.dispatch("n").unwrap();
        assert!(out.contains("r0  = 0x00000005"));
    }

    #[test]
    fn continue_without_rom_is_an_error() {
        let mut shell = Shell::new(GbaEmulator::new(), false);
        let err = shell.dispatch("c").unwrap_err();
        assert!(matches!(err, ShellError::NoRomLoaded));
    }

    #[test]
    fn execute_breakpoint_stops_continue() {
        let mut rom = vec![0u8; 8];
        rom[0..4].copy_from_slice(&0xE3A0_0005u32.to_le_bytes());
        let mut shell = shell_with_rom(rom);
        shell.dispatch("b 0x08000000").unwrap();
        let out = shell.dispatch("c 0").unwrap();
        assert!(out.contains("execute breakpoint"));
    }

    #[test]
    fn save_and_load_snapshot_roundtrips_registers() {
        let mut shell = shell_with_rom(vec![0u8; 16]);
        shell.emulator.cpu.regs.r[0] = 0x42;
        shell.dispatch("save mysave").unwrap();
        shell.emulator.cpu.regs.r[0] = 0;
        shell.dispatch("load mysave").unwrap();
        assert_eq!(shell.emulator.cpu.regs.r[0], 0x42);
    }

    #[test]
    fn load_unknown_snapshot_is_an_error() {
        let mut shell = shell_with_rom(vec![0u8; 16]);
        let err = shell.dispatch("load nope").unwrap_err();
        assert!(matches!(err, ShellError::UnknownSnapshot(_)));
    }

    #[test]
    fn reset_restores_documented_initial_registers() {
        let mut shell = shell_with_rom(vec![0u8; 16]);
        shell.emulator.cpu.regs.r[0] = 0x999;
        shell.dispatch("reset").unwrap();
        assert_eq!(shell.emulator.cpu.regs.r[0], INITIAL_REGS[0]);
        assert_eq!(shell.emulator.cpu.regs.cpsr, INITIAL_CPSR);
    }

    #[test]
    fn memory_dump_reports_hex_and_ascii() {
        let mut rom = vec![0u8; 16];
        rom[0] = b'H';
        rom[1] = b'i';
        let mut shell = shell_with_rom(rom);
        let out = shell.dispatch("m 0x08000000 2").unwrap();
        assert!(out.contains("48 69"));
        assert!(out.contains("Hi"));
    }

    #[test]
    fn disassemble_thumb_reports_mnemonic() {
        let mut rom = vec![0u8; 4];
        rom[0..2].copy_from_slice(&0x2007u16.to_le_bytes());
        let mut shell = shell_with_rom(rom);
        shell.emulator.cpu.regs.set_thumb(true);
        let out = shell.dispatch("dist 0x08000000").unwrap();
        assert!(out.contains("mov r0, #0x7"));
    }
}
