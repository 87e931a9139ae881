// Caricamento/esportazione di savestate (§6.4), supplementato dal
// round-trip in-memory degli snapshot con nome che l'originale espone
// tramite `save`/`load`/`ds` (§4 di SPEC_FULL.md).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

use gba_arm7tdmi::Registers;

use crate::memory::Memory;

#[derive(Error, Debug)]
pub enum SavestateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decompressed image too short: got {got} bytes, need at least {need}")]
    TooShort { got: usize, need: usize },
}

/// Offset dei dati effettivi dentro l'immagine decompressa.
const BASE: usize = 0x1DF;
const MIN_LEN: usize = 0x6_8800 + BASE;

struct RegionLayout {
    wram: (usize, usize),
    iram: (usize, usize),
    io: (usize, usize),
    palette: (usize, usize),
    vram: (usize, usize),
    oam: (usize, usize),
}

const LAYOUT: RegionLayout = RegionLayout {
    wram: (0x0_8400, 0x4_8400),
    iram: (0x0_0000, 0x0_8000),
    io: (0x8_EA08, 0x8_EE08),
    palette: (0x0_8000, 0x0_8400),
    vram: (0x4_8400, 0x6_0400),
    oam: (0x6_8400, 0x6_8800),
};

/// Snapshot in-memory tenuto dalla shell per `save`/`load`/`ds` (nome
/// default `PRIORSTATE`): RAM più i 17 registri.
#[derive(Clone)]
pub struct Snapshot {
    pub ewram: Vec<u8>,
    pub iwram: Vec<u8>,
    pub io_registers: Vec<u8>,
    pub palette_ram: Vec<u8>,
    pub vram: Vec<u8>,
    pub oam: Vec<u8>,
    pub registers: Registers,
}

impl Snapshot {
    pub fn capture(memory: &Memory, regs: &Registers) -> Self {
        Self {
            ewram: memory.ewram.clone(),
            iwram: memory.iwram.clone(),
            io_registers: memory.io_registers.clone(),
            palette_ram: memory.palette_ram.clone(),
            vram: memory.vram.clone(),
            oam: memory.oam.clone(),
            registers: regs.clone(),
        }
    }

    pub fn restore(&self, memory: &mut Memory, regs: &mut Registers) {
        memory.ewram.copy_from_slice(&self.ewram);
        memory.iwram.copy_from_slice(&self.iwram);
        memory.io_registers.copy_from_slice(&self.io_registers);
        memory.palette_ram.copy_from_slice(&self.palette_ram);
        memory.vram.copy_from_slice(&self.vram);
        memory.oam.copy_from_slice(&self.oam);
        *regs = self.registers.clone();
    }
}

/// Decomprime un file savestate gzippato e ne ricava RAM + registri secondo
/// i layout a offset fisso di §6.4.
pub fn load_file<P: AsRef<Path>>(
    path: P,
    memory: &mut Memory,
    regs: &mut Registers,
) -> Result<(), SavestateError> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(file);
    let mut image = Vec::new();
    decoder.read_to_end(&mut image)?;
    apply_image(&image, memory, regs)
}

fn apply_image(image: &[u8], memory: &mut Memory, regs: &mut Registers) -> Result<(), SavestateError> {
    if image.len() < MIN_LEN {
        return Err(SavestateError::TooShort {
            got: image.len(),
            need: MIN_LEN,
        });
    }

    copy_region(image, &mut memory.ewram, LAYOUT.wram);
    copy_region(image, &mut memory.iwram, LAYOUT.iram);
    copy_region(image, &mut memory.io_registers, LAYOUT.io);
    copy_region(image, &mut memory.palette_ram, LAYOUT.palette);
    copy_region(image, &mut memory.vram, LAYOUT.vram);
    copy_region(image, &mut memory.oam, LAYOUT.oam);

    for i in 0..16 {
        let off = BASE + 24 + i * 4;
        regs.r[i] = u32::from_le_bytes([image[off], image[off + 1], image[off + 2], image[off + 3]]);
    }

    let thumb = image[BASE + 88] & (1 << 5) != 0;
    regs.set_thumb(thumb);

    let nzcv = (image[BASE + 91] >> 4) & 0xF;
    regs.set_flags(nzcv & 0x8 != 0, nzcv & 0x4 != 0, nzcv & 0x2 != 0, nzcv & 0x1 != 0);

    Ok(())
}

fn copy_region(image: &[u8], dest: &mut [u8], (start, end): (usize, usize)) {
    let src = &image[BASE + start..BASE + end];
    let len = dest.len().min(src.len());
    dest[..len].copy_from_slice(&src[..len]);
}

/// Esporta l'immagine RAM corrente come savestate gzippato (`exportstate`).
pub fn export_file<P: AsRef<Path>>(path: P, memory: &Memory, regs: &Registers) -> Result<(), SavestateError> {
    let mut image = vec![0u8; MIN_LEN];

    write_region(&mut image, &memory.ewram, LAYOUT.wram);
    write_region(&mut image, &memory.iwram, LAYOUT.iram);
    write_region(&mut image, &memory.io_registers, LAYOUT.io);
    write_region(&mut image, &memory.palette_ram, LAYOUT.palette);
    write_region(&mut image, &memory.vram, LAYOUT.vram);
    write_region(&mut image, &memory.oam, LAYOUT.oam);

    for i in 0..16 {
        let off = BASE + 24 + i * 4;
        image[off..off + 4].copy_from_slice(&regs.r[i].to_le_bytes());
    }
    if regs.is_thumb() {
        image[BASE + 88] |= 1 << 5;
    }
    let nzcv = (regs.flag_n() as u8) << 3
        | (regs.flag_z() as u8) << 2
        | (regs.flag_c() as u8) << 1
        | (regs.flag_v() as u8);
    image[BASE + 91] |= nzcv << 4;

    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&image)?;
    encoder.finish()?;
    Ok(())
}

fn write_region(image: &mut [u8], src: &[u8], (start, end): (usize, usize)) {
    let dest = &mut image[BASE + start..BASE + end];
    let len = dest.len().min(src.len());
    dest[..len].copy_from_slice(&src[..len]);
}

/// Scrive il buffer ROM corrente su file, non compresso (`exportrom`).
pub fn export_rom<P: AsRef<Path>>(path: P, rom: &[u8]) -> Result<(), SavestateError> {
    let mut file = File::create(path)?;
    file.write_all(rom)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Vec<u8> {
        let mut image = vec![0u8; MIN_LEN];
        image[BASE + 24] = 0x34; // r0 low byte
        image[BASE + 25] = 0x12;
        image[BASE + 88] = 1 << 5; // T set
        image[BASE + 91] = 0xA << 4; // N=1,Z=0,C=1,V=0
        image
    }

    #[test]
    fn apply_image_rejects_short_buffers() {
        let mut memory = Memory::new();
        let mut regs = Registers::new();
        let err = apply_image(&[0u8; 10], &mut memory, &mut regs).unwrap_err();
        assert!(matches!(err, SavestateError::TooShort { .. }));
    }

    #[test]
    fn apply_image_restores_registers_and_flags() {
        let mut memory = Memory::new();
        let mut regs = Registers::new();
        apply_image(&sample_image(), &mut memory, &mut regs).unwrap();
        assert_eq!(regs.r[0], 0x1234);
        assert!(regs.is_thumb());
        assert!(regs.flag_n());
        assert!(!regs.flag_z());
        assert!(regs.flag_c());
        assert!(!regs.flag_v());
    }

    #[test]
    fn snapshot_round_trips_ram_and_registers() {
        let mut memory = Memory::new();
        let mut regs = Registers::new();
        memory.ewram[10] = 0x42;
        regs.set_pc(0x0800_1234);

        let snap = Snapshot::capture(&memory, &regs);

        memory.ewram[10] = 0;
        regs.set_pc(0);

        snap.restore(&mut memory, &mut regs);
        assert_eq!(memory.ewram[10], 0x42);
        assert_eq!(regs.pc(), 0x0800_1234);
    }
}
