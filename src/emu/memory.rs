use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::{Chip8Error, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS};

// The constants are specified by the CHIP-8 specification
pub const MEMORY_SIZE: usize = 4096;
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;

/// 4KB of bounds-checked, byte-addressable memory.
///
/// A fresh memory holds the font at `FONT_START_ADDRESS` and zeroes elsewhere.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(with = "BigArray")]
    data: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        let mut data = [0; MEMORY_SIZE];
        data[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        Memory { data }
    }

    pub fn read(&self, addr: usize) -> Result<u8, Chip8Error> {
        self.data
            .get(addr)
            .copied()
            .ok_or(Chip8Error::AddressOutOfRange { address: addr })
    }

    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), Chip8Error> {
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(Chip8Error::AddressOutOfRange { address: addr })?;
        *cell = value;
        Ok(())
    }

    /// Returns `len` bytes starting at `addr`, failing if any of them is out of range.
    pub fn slice(&self, addr: usize, len: usize) -> Result<&[u8], Chip8Error> {
        let end = addr.saturating_add(len);
        self.data.get(addr..end).ok_or(Chip8Error::AddressOutOfRange {
            address: addr.max(MEMORY_SIZE),
        })
    }

    /// Writes `bytes` starting at `addr`. Nothing is written unless every byte fits.
    pub fn write_bytes(&mut self, addr: usize, bytes: &[u8]) -> Result<(), Chip8Error> {
        let end = addr.saturating_add(bytes.len());
        let target = self
            .data
            .get_mut(addr..end)
            .ok_or(Chip8Error::AddressOutOfRange {
                address: addr.max(MEMORY_SIZE),
            })?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    /// Copies a ROM to `ROM_START_ADDRESS`. Nothing is written if it does not fit.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        self.data[ROM_START_ADDRESS..ROM_START_ADDRESS + rom.len()].copy_from_slice(rom);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8; MEMORY_SIZE] {
        &self.data
    }

    pub(crate) fn from_bytes(data: [u8; MEMORY_SIZE]) -> Self {
        Memory { data }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.data.len())
            .finish_non_exhaustive()
    }
}
