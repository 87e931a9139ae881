// Entry point del debugger a riga di comando (§6.1): carica una ROM e,
// opzionalmente, un savestate, poi consegna il controllo al loop della shell.
// Grounded sul pattern di `gba-frontend-sdl2/src/main.rs` (env_logger +
// anyhow::Context sui percorsi), con argomenti posizionali gestiti da clap
// invece del parsing manuale di `env::args()` dell'originale.

mod assemble;
mod disasm;
mod expr;
mod funcflow;
mod shell;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use gba_core::{Cartridge, GbaEmulator};

use shell::Shell;

/// Shell di debug istruzione-per-istruzione per la CPU ARM7TDMI del GBA.
#[derive(Parser, Debug)]
#[command(name = "gba-debugger", version, about)]
struct Cli {
    /// Percorso del file ROM da caricare.
    rom_path: PathBuf,

    /// Savestate opzionale da applicare subito dopo il caricamento della ROM.
    savestate_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    log::info!("gba-debugger {}", env!("CARGO_PKG_VERSION"));

    let mut emulator = GbaEmulator::new();

    log::info!("loading ROM from {}", cli.rom_path.display());
    let cartridge = Cartridge::load(&cli.rom_path)
        .with_context(|| format!("failed to load ROM: {}", cli.rom_path.display()))?;
    emulator.load_cartridge(cartridge);

    if let Some(path) = &cli.savestate_path {
        log::info!("loading savestate from {}", path.display());
        gba_core::savestate::load_file(path, &mut emulator.bus.memory, &mut emulator.cpu.regs)
            .with_context(|| format!("failed to load savestate: {}", path.display()))?;
    }

    let mut shell = Shell::new(emulator, true);
    let stdin = std::io::stdin();
    shell.run_repl(stdin.lock(), std::io::stdout())?;

    Ok(())
}
