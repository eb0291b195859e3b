use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use log::warn;

use super::{Chip8, Chip8Error, Chip8Result, Config, Framebuffer};
use crate::u4;

/// What a frame tick hands to the host.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Copy of the display at the end of the tick.
    pub framebuffer: Framebuffer,
    /// True on the tick the sound timer ran out.
    pub beep: bool,
}

/// Fixed-rate frame driver.
///
/// Each tick runs a batch of CPU cycles, then decrements the timers once,
/// then publishes a copy of the framebuffer.
pub struct Chip8Runner {
    chip8: Chip8,
    opcodes_per_frame: u32,
    frame_duration: Duration,
    stop: Arc<AtomicBool>,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8, config: &Config) -> Result<Self, Chip8Error> {
        config.validate()?;

        Ok(Self {
            chip8,
            opcodes_per_frame: config.opcodes_per_frame(),
            frame_duration: Duration::from_secs_f64(1.0 / f64::from(config.frame_rate)),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Builds a runner around a fresh machine using the config's quirks.
    pub fn from_config(config: &Config) -> Result<Self, Chip8Error> {
        Self::new(Chip8::with_quirks(config.quirks), config)
    }

    /// Runs one frame tick.
    ///
    /// The batch ends early when the CPU is parked on `FX0A`. A stopped runner
    /// executes nothing and returns the current display.
    pub fn tick(&mut self) -> Result<Frame, Chip8Error> {
        if self.is_stopped() {
            return Ok(self.frame(false));
        }

        for _ in 0..self.opcodes_per_frame {
            match self.chip8.step()? {
                Chip8Result::WaitForKey => break,
                Chip8Result::Continue => {}
            }
        }

        let beep = self.chip8.decrement_timers();
        Ok(self.frame(beep))
    }

    /// Handle other threads can use to stop the runner at the next tick boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        warn!("Stopping emulation");
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn opcodes_per_frame(&self) -> u32 {
        self.opcodes_per_frame
    }

    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        self.chip8.load_rom(rom)
    }

    pub fn load_rom_file(&mut self, path: &Path) -> Result<(), Chip8Error> {
        self.chip8.load_rom_file(path)
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    pub fn key_down(&mut self, symbol: char) {
        self.chip8.key_down(symbol)
    }

    pub fn key_up(&mut self, symbol: char) {
        self.chip8.key_up(symbol)
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }

    fn frame(&self, beep: bool) -> Frame {
        Frame {
            framebuffer: *self.chip8.framebuffer(),
            beep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::PIXEL_ON;

    fn runner_with_program(program: &[u8], config: Config) -> Chip8Runner {
        let mut runner = Chip8Runner::from_config(&config).unwrap();
        runner.load_rom(program).unwrap();
        runner
    }

    #[test]
    fn test_tick_runs_one_batch() {
        // Ten increments of V0 followed by an infinite loop
        let mut program = Vec::new();
        for _ in 0..10 {
            program.extend_from_slice(&[0x70, 0x01]);
        }
        program.extend_from_slice(&[0x12, 0x14]);

        let config = Config {
            frame_rate: 60,
            opcodes_per_second: 240,
            ..Config::default()
        };
        let mut runner = runner_with_program(&program, config);
        assert_eq!(runner.opcodes_per_frame(), 4);

        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 4);
        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 8);
        runner.tick().unwrap();
        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 10);
        assert_eq!(runner.chip8_ref().pc(), 0x214);
    }

    #[test]
    fn test_timers_decrement_once_per_tick() {
        // V1 = 5; DT = V1; loop
        let mut runner = runner_with_program(&[0x61, 0x05, 0xF1, 0x15, 0x12, 0x04], Config::default());

        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().delay_timer(), 4);
        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().delay_timer(), 3);
    }

    #[test]
    fn test_beep_reported_on_single_tick() {
        // V1 = 2; ST = V1; loop
        let mut runner = runner_with_program(&[0x61, 0x02, 0xF1, 0x18, 0x12, 0x04], Config::default());

        let beeps: Vec<bool> = (0..4).map(|_| runner.tick().unwrap().beep).collect();
        assert_eq!(beeps, vec![false, true, false, false]);
    }

    #[test]
    fn test_wait_for_key_keeps_pc_across_ticks() {
        // Wait for key into V2, then draw glyph of the key at (0, 0)
        let mut runner = runner_with_program(
            &[0xF2, 0x0A, 0xF2, 0x29, 0x63, 0x00, 0xD3, 0x35, 0x12, 0x08],
            Config::default(),
        );

        let frame = runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().pc(), 0x200);
        assert!(frame.framebuffer.iter().all(|&p| p == 0));

        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().pc(), 0x200);

        runner.key_down('1');
        let frame = runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().v()[2], 1);
        // Top row of glyph "1" is 0x20
        assert_eq!(frame.framebuffer[2], PIXEL_ON);
    }

    #[test]
    fn test_frame_is_a_copy() {
        let mut runner = runner_with_program(&[0x00, 0xE0, 0x12, 0x02], Config::default());
        let frame = runner.tick().unwrap();
        runner.chip8_mut().framebuffer[0] = PIXEL_ON;
        assert_eq!(frame.framebuffer[0], 0);
    }

    #[test]
    fn test_stopped_runner_does_not_execute() {
        let mut runner = runner_with_program(&[0x70, 0x01, 0x12, 0x00], Config::default());
        let handle = runner.stop_handle();
        handle.store(true, Ordering::SeqCst);

        assert!(runner.is_stopped());
        runner.tick().unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 0);
        assert_eq!(runner.chip8_ref().pc(), 0x200);
    }

    #[test]
    fn test_errors_surface_from_tick() {
        let mut runner = runner_with_program(&[0x00, 0xEE], Config::default());
        assert!(matches!(runner.tick(), Err(Chip8Error::StackUnderflow)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            frame_rate: 0,
            ..Config::default()
        };
        assert!(Chip8Runner::from_config(&config).is_err());
    }
}
