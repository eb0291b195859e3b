use super::Chip8Error;

pub const DEFAULT_FRAME_RATE: u32 = 60;
pub const DEFAULT_OPCODES_PER_SECOND: u32 = 700;

/// How `DXYN` treats sprite pixels past the right edge of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpriteEdge {
    /// Pixels continue into the next row of the framebuffer.
    #[default]
    Spill,
    /// Pixels past column 63 are dropped.
    Clip,
}

/// Behaviors that differ between CHIP-8 interpreters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quirks {
    pub sprite_edge: SpriteEdge,
}

/// Emulator configuration. Timing is only read by the frame driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Frame ticks per second.
    pub frame_rate: u32,
    /// Opcodes executed per second, spread evenly over the frames.
    pub opcodes_per_second: u32,
    pub quirks: Quirks,
}

impl Config {
    pub fn validate(&self) -> Result<(), Chip8Error> {
        if self.frame_rate == 0 {
            return Err(Chip8Error::InvalidConfig(
                "frame rate must be greater than zero".to_string(),
            ));
        }
        if self.opcodes_per_second < self.frame_rate {
            return Err(Chip8Error::InvalidConfig(format!(
                "{} opcodes per second is less than one opcode per frame at {} fps",
                self.opcodes_per_second, self.frame_rate
            )));
        }
        Ok(())
    }

    pub fn opcodes_per_frame(&self) -> u32 {
        self.opcodes_per_second / self.frame_rate.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            opcodes_per_second: DEFAULT_OPCODES_PER_SECOND,
            quirks: Quirks::default(),
        }
    }
}
