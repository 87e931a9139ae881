// Caricamento ROM (§6.3): flusso di byte opaco, nessun parsing dell'header.
// Il buffer viene piazzato verbatim nella regione ROM dal bus.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("failed to read ROM file: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Cartridge {
    pub rom: Vec<u8>,
    pub rom_path: PathBuf,
}

impl Cartridge {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let rom = fs::read(path.as_ref())?;
        Ok(Self {
            rom,
            rom_path: path.as_ref().to_path_buf(),
        })
    }
}
