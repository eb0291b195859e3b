use std::path::PathBuf;

use crate::u4;

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
pub const FRAMEBUFFER_SIZE: usize = DISPLAY_X * DISPLAY_Y;

/// Framebuffer byte for a lit pixel. Unlit pixels are 0.
pub const PIXEL_ON: u8 = 0xFF;

/// The CHIP-8 display buffer, row-major, one byte (0 or 255) per pixel.
pub type Framebuffer = [u8; FRAMEBUFFER_SIZE];

/// Maps a 2D screen coordinate to its linear framebuffer index.
///
/// No bounds check is done here; callers decide how to treat indices past the end.
pub const fn pixel_index(x: usize, y: usize) -> usize {
    y * DISPLAY_X + x
}

/// Result type for CHIP-8 CPU cycle execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8Result {
    /// Continue executing instructions in the current frame.
    Continue,
    /// The CPU is blocked on `FX0A`; the rest of the frame's batch can be skipped.
    WaitForKey,
}

/// Whether the CPU is fetching instructions or parked on `FX0A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Running,
    /// Waiting for any key; the pressed key goes into this register.
    AwaitingKey(u4),
}

/// Error types that can occur during CHIP-8 emulation
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    AddressOutOfRange { address: usize },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Stack overflow: more than {limit} nested subroutine calls")]
    StackOverflow { limit: usize },

    #[error("Failed to read ROM file {}", path.display())]
    RomRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid save state: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for Chip8Error {
    fn from(e: serde_json::Error) -> Self {
        Chip8Error::InvalidSnapshot(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_index_is_row_major() {
        assert_eq!(pixel_index(0, 0), 0);
        assert_eq!(pixel_index(63, 0), 63);
        assert_eq!(pixel_index(0, 1), 64);
        assert_eq!(pixel_index(63, 31), FRAMEBUFFER_SIZE - 1);
    }

    #[test]
    fn test_error_messages_show_hex_addresses() {
        let err = Chip8Error::AddressOutOfRange { address: 0x1000 };
        assert_eq!(
            err.to_string(),
            "Memory access out of bounds at address 0x1000"
        );
    }
}
