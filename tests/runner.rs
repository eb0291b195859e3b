use chip8_vm::emu::{
    Chip8Runner, Config, DISPLAY_X, ExecState, Framebuffer, PIXEL_ON, Snapshot,
};

/// Stores 123 as BCD and draws the three digits side by side at the top left.
const BCD_DIGITS_ROM: [u8; 30] = [
    0x63, 0x7B, // V3 = 123
    0xA3, 0x00, // I = 0x300
    0xF3, 0x33, // BCD of V3
    0xF2, 0x65, // V0..V2 = digits
    0x64, 0x00, // V4 = 0
    0x65, 0x00, // V5 = 0
    0xF0, 0x29, // I = glyph V0
    0xD4, 0x55, // draw
    0x74, 0x05, // V4 += 5
    0xF1, 0x29, // I = glyph V1
    0xD4, 0x55, // draw
    0x74, 0x05, // V4 += 5
    0xF2, 0x29, // I = glyph V2
    0xD4, 0x55, // draw
    0x12, 0x1C, // loop
];

fn row_text(framebuffer: &Framebuffer, y: usize, width: usize) -> String {
    framebuffer[y * DISPLAY_X..y * DISPLAY_X + width]
        .iter()
        .map(|&pixel| if pixel == PIXEL_ON { '#' } else { '.' })
        .collect()
}

fn runner_with_rom(rom: &[u8]) -> Chip8Runner {
    let mut runner = Chip8Runner::from_config(&Config::default()).unwrap();
    runner.load_rom(rom).unwrap();
    runner
}

#[test]
fn draws_bcd_digits() {
    let mut runner = runner_with_rom(&BCD_DIGITS_ROM);

    runner.tick().unwrap();
    let frame = runner.tick().unwrap();

    let rows: Vec<String> = (0..5).map(|y| row_text(&frame.framebuffer, y, 15)).collect();
    assert_eq!(
        rows,
        vec![
            "..#..####.####.",
            ".##.....#....#.",
            "..#..####.####.",
            "..#..#.......#.",
            ".###.####.####.",
        ]
    );
    assert_eq!(runner.chip8_ref().v()[0xF], 0);
    assert_eq!(runner.chip8_ref().pc(), 0x21C);
}

#[test]
fn waits_for_key_then_beeps() {
    // V0 = key; ST = V0; loop
    let mut runner = runner_with_rom(&[0xF0, 0x0A, 0xF0, 0x18, 0x12, 0x04]);

    for _ in 0..3 {
        let frame = runner.tick().unwrap();
        assert!(!frame.beep);
        assert_eq!(
            runner.chip8_ref().exec_state(),
            ExecState::AwaitingKey(chip8_vm::u4::new(0))
        );
    }

    // '2' is keypad 2, so the sound timer runs for two frames
    runner.key_down('2');
    let beeps: Vec<bool> = (0..3).map(|_| runner.tick().unwrap().beep).collect();
    runner.key_up('2');

    assert_eq!(runner.chip8_ref().v()[0], 2);
    assert_eq!(beeps, vec![false, true, false]);
}

#[test]
fn save_state_survives_json_and_resumes() {
    let mut original = runner_with_rom(&BCD_DIGITS_ROM);
    original.tick().unwrap();

    let json = original.chip8_ref().snapshot().to_json().unwrap();
    let mut restored = Chip8Runner::from_config(&Config::default()).unwrap();
    restored
        .chip8_mut()
        .restore(&Snapshot::from_json(&json).unwrap())
        .unwrap();

    let expected = original.tick().unwrap();
    let actual = restored.tick().unwrap();

    assert_eq!(actual.framebuffer, expected.framebuffer);
    assert_eq!(restored.chip8_ref().snapshot(), original.chip8_ref().snapshot());
}

#[test]
fn loads_rom_from_file() {
    let path = std::env::temp_dir().join(format!("chip8-vm-test-{}.ch8", std::process::id()));
    std::fs::write(&path, BCD_DIGITS_ROM).unwrap();

    let mut runner = Chip8Runner::from_config(&Config::default()).unwrap();
    let result = runner.load_rom_file(&path);
    std::fs::remove_file(&path).unwrap();

    result.unwrap();
    assert_eq!(
        &runner.chip8_ref().memory().as_bytes()[0x200..0x200 + BCD_DIGITS_ROM.len()],
        &BCD_DIGITS_ROM[..]
    );
}
