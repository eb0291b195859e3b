use std::path::Path;

use log::{debug, info};

use super::{
    Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, ExecState, FRAMEBUFFER_SIZE, Framebuffer,
    Keyboard, MAX_ROM_SIZE, Memory, Opcode, PIXEL_ON, Quirks, ROM_START_ADDRESS, pixel_index,
};
use crate::u4;

/// Maximum depth of nested subroutine calls.
pub const STACK_LIMIT: usize = 16;

/// CHIP-8 virtual machine state
#[derive(Debug, Clone)]
pub struct Chip8 {
    /// 4KB memory
    pub(crate) memory: Memory,
    /// Display buffer: 64x32 monochrome pixels, 0 or 255
    pub(crate) framebuffer: Framebuffer,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack for subroutine returns
    pub(crate) stack: Vec<u16>,

    /// Delay timer: decrements once per frame until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements once per frame, beeps when it runs out
    pub(crate) sound_timer: u8,

    pub(crate) keyboard: Keyboard,
    pub(crate) state: ExecState,
    pub(crate) quirks: Quirks,
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_quirks(Quirks::default())
    }

    pub fn with_quirks(quirks: Quirks) -> Self {
        Chip8 {
            memory: Memory::new(),
            framebuffer: [0; FRAMEBUFFER_SIZE],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: Vec::with_capacity(STACK_LIMIT),
            delay_timer: 0,
            sound_timer: 0,
            keyboard: Keyboard::new(),
            state: ExecState::Running,
            quirks,
        }
    }

    /// Reinitializes every field except the quirks.
    pub fn reset(&mut self) {
        debug!("Resetting CHIP-8 state");
        *self = Self::with_quirks(self.quirks);
    }

    /// Resets the machine and loads a ROM at 0x200.
    ///
    /// The size is checked first, so a failing load leaves the machine untouched.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        self.reset();
        self.memory.load_rom(rom)?;
        info!("Loaded {} byte ROM at {:#05X}", rom.len(), ROM_START_ADDRESS);

        Ok(())
    }

    /// Reads a ROM file and loads it. I/O failures leave the machine untouched.
    pub fn load_rom_file(&mut self, path: &Path) -> Result<(), Chip8Error> {
        let rom = std::fs::read(path).map_err(|source| Chip8Error::RomRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_rom(&rom)
    }

    /// Executes a single CPU cycle.
    ///
    /// While waiting on `FX0A` nothing is fetched; the cycle only checks the keypad.
    pub fn step(&mut self) -> Result<Chip8Result, Chip8Error> {
        if let ExecState::AwaitingKey(x) = self.state {
            return Ok(self.resume_on_key(x));
        }

        let opcode = self.read_next_opcode()?;
        self.execute(Opcode::decode(opcode))
    }

    /// Fetches the big-endian opcode at PC and advances PC past it.
    pub fn read_next_opcode(&mut self) -> Result<u16, Chip8Error> {
        let pc = usize::from(self.pc);
        let high = self.memory.read(pc)?;
        let low = self.memory.read(pc + 1)?;
        self.pc = self.pc.wrapping_add(2);

        Ok(u16::from_be_bytes([high, low]))
    }

    /// Decrements both timers. Returns true when a beep should be played.
    ///
    /// The beep fires once, on the tick that takes the sound timer from 1 to 0.
    pub fn decrement_timers(&mut self) -> bool {
        self.delay_timer = self.delay_timer.saturating_sub(1);

        let beep = self.sound_timer == 1;
        self.sound_timer = self.sound_timer.saturating_sub(1);
        beep
    }

    pub fn key_down(&mut self, symbol: char) {
        self.keyboard.key_down(symbol);
    }

    pub fn key_up(&mut self, symbol: char) {
        self.keyboard.key_up(symbol);
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keyboard.set_key(key, pressed);
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_X && y < DISPLAY_Y && self.framebuffer[pixel_index(x, y)] == PIXEL_ON
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn v(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn exec_state(&self) -> ExecState {
        self.state
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    fn resume_on_key(&mut self, x: u4) -> Chip8Result {
        match self.keyboard.any_key() {
            Some(key) => {
                self.v[x] = key.value();
                // Move past the FX0A that PC was left pointing at
                self.pc = self.pc.wrapping_add(2);
                self.state = ExecState::Running;
                Chip8Result::Continue
            }
            None => Chip8Result::WaitForKey,
        }
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::{FONT, MEMORY_SIZE};

    #[test]
    fn test_new_starts_at_program_address() {
        let chip8 = Chip8::new();
        assert_eq!(chip8.pc(), 0x200);
        assert_eq!(chip8.i(), 0);
        assert_eq!(chip8.v(), &[0; 16]);
        assert!(chip8.stack().is_empty());
        assert_eq!(&chip8.memory().as_bytes()[..FONT.len()], &FONT[..]);
        assert_eq!(chip8.exec_state(), ExecState::Running);
    }

    #[test]
    fn test_read_next_opcode_is_big_endian_and_advances() {
        let mut chip8 = Chip8::new();
        chip8.load_rom(&[0xAA, 0xBB, 0x12, 0x34]).unwrap();
        assert_eq!(chip8.read_next_opcode().unwrap(), 0xAABB);
        assert_eq!(chip8.pc(), 0x202);
        assert_eq!(chip8.read_next_opcode().unwrap(), 0x1234);
        assert_eq!(chip8.pc(), 0x204);
    }

    #[test]
    fn test_fetch_past_end_of_memory_fails() {
        let mut chip8 = Chip8::new();
        chip8.pc = (MEMORY_SIZE - 1) as u16;
        assert!(matches!(
            chip8.read_next_opcode(),
            Err(Chip8Error::AddressOutOfRange { address: 0x1000 })
        ));
        assert_eq!(chip8.pc(), (MEMORY_SIZE - 1) as u16);
    }

    #[test]
    fn test_load_rom_resets_state() {
        let mut chip8 = Chip8::new();
        chip8.v[3] = 9;
        chip8.i = 0x300;
        chip8.stack.push(0x222);
        chip8.delay_timer = 5;
        chip8.framebuffer[10] = PIXEL_ON;
        chip8.set_key(u4::new(2), true);

        chip8.load_rom(&[0x00, 0xE0]).unwrap();

        assert_eq!(chip8.v()[3], 0);
        assert_eq!(chip8.i(), 0);
        assert!(chip8.stack().is_empty());
        assert_eq!(chip8.delay_timer(), 0);
        assert!(chip8.framebuffer().iter().all(|&p| p == 0));
        assert_eq!(chip8.keyboard().any_key(), None);
        assert_eq!(chip8.pc(), 0x200);
    }

    #[test]
    fn test_reset_keeps_quirks() {
        let quirks = Quirks {
            sprite_edge: crate::emu::SpriteEdge::Clip,
        };
        let mut chip8 = Chip8::with_quirks(quirks);
        chip8.reset();
        assert_eq!(chip8.quirks(), quirks);
    }

    #[test]
    fn test_oversized_rom_leaves_state_untouched() {
        let mut chip8 = Chip8::new();
        chip8.load_rom(&[0x61, 0x05]).unwrap();
        chip8.v[1] = 5;

        let result = chip8.load_rom(&vec![0; MAX_ROM_SIZE + 1]);

        assert!(matches!(result, Err(Chip8Error::RomTooLarge { .. })));
        assert_eq!(chip8.v()[1], 5);
        assert_eq!(chip8.memory().read(0x200).unwrap(), 0x61);
    }

    #[test]
    fn test_missing_rom_file_leaves_state_untouched() {
        let mut chip8 = Chip8::new();
        chip8.load_rom(&[0x61, 0x05]).unwrap();

        let result = chip8.load_rom_file(Path::new("/definitely/not/a/rom.ch8"));

        assert!(matches!(result, Err(Chip8Error::RomRead { .. })));
        assert_eq!(chip8.memory().read(0x200).unwrap(), 0x61);
    }

    #[test]
    fn test_timers_stop_at_zero() {
        let mut chip8 = Chip8::new();
        chip8.delay_timer = 2;
        chip8.decrement_timers();
        assert_eq!(chip8.delay_timer(), 1);
        chip8.decrement_timers();
        chip8.decrement_timers();
        assert_eq!(chip8.delay_timer(), 0);
        assert_eq!(chip8.sound_timer(), 0);
    }

    #[test]
    fn test_sound_timer_beeps_once_per_countdown() {
        let mut chip8 = Chip8::new();
        chip8.sound_timer = 3;

        let beeps: Vec<bool> = (0..5).map(|_| chip8.decrement_timers()).collect();

        assert_eq!(beeps, vec![false, false, true, false, false]);
        assert_eq!(chip8.sound_timer(), 0);
    }

    #[test]
    fn test_pixel_out_of_bounds_is_off() {
        let mut chip8 = Chip8::new();
        chip8.framebuffer = [PIXEL_ON; FRAMEBUFFER_SIZE];
        assert!(chip8.pixel(63, 31));
        assert!(!chip8.pixel(64, 0));
        assert!(!chip8.pixel(0, 32));
    }
}
