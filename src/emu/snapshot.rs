use log::debug;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::{
    Chip8, Chip8Error, ExecState, Framebuffer, KEY_COUNT, Keyboard, MEMORY_SIZE, Memory,
    PIXEL_ON, STACK_LIMIT,
};

/// A bit-exact copy of the machine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "BigArray")]
    pub memory: [u8; MEMORY_SIZE],
    pub v: [u8; 16],
    pub i: u16,
    pub pc: u16,
    /// Oldest return address first.
    pub stack: Vec<u16>,
    pub delay_timer: u8,
    pub sound_timer: u8,
    #[serde(with = "BigArray")]
    pub framebuffer: Framebuffer,
    pub keys: [bool; KEY_COUNT],
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, Chip8Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Chip8Error> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), Chip8Error> {
        if self.stack.len() > STACK_LIMIT {
            return Err(Chip8Error::InvalidSnapshot(format!(
                "stack holds {} entries, limit is {}",
                self.stack.len(),
                STACK_LIMIT
            )));
        }
        if let Some(pixel) = self.framebuffer.iter().find(|&&p| p != 0 && p != PIXEL_ON) {
            return Err(Chip8Error::InvalidSnapshot(format!(
                "framebuffer pixel value {pixel} is neither 0 nor {PIXEL_ON}"
            )));
        }
        Ok(())
    }
}

impl Chip8 {
    pub fn snapshot(&self) -> Snapshot {
        debug!("Taking snapshot at PC {:#05X}", self.pc);

        Snapshot {
            memory: *self.memory.as_bytes(),
            v: self.v,
            i: self.i,
            pc: self.pc,
            stack: self.stack.clone(),
            delay_timer: self.delay_timer,
            sound_timer: self.sound_timer,
            framebuffer: self.framebuffer,
            keys: *self.keyboard.state(),
        }
    }

    /// Replaces the machine state with a snapshot. Quirks are kept.
    ///
    /// The CPU resumes in the running state; a snapshot taken while waiting on
    /// `FX0A` still has PC on that instruction, so it is re-issued.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), Chip8Error> {
        snapshot.validate()?;
        debug!("Restoring snapshot at PC {:#05X}", snapshot.pc);

        self.memory = Memory::from_bytes(snapshot.memory);
        self.v = snapshot.v;
        self.i = snapshot.i;
        self.pc = snapshot.pc;
        self.stack = snapshot.stack.clone();
        self.delay_timer = snapshot.delay_timer;
        self.sound_timer = snapshot.sound_timer;
        self.framebuffer = snapshot.framebuffer;
        self.keyboard = Keyboard::from_state(snapshot.keys);
        self.state = ExecState::Running;

        Ok(())
    }
}
