use crate::u4;

pub const KEY_COUNT: usize = 16;

/// Mapping from physical keyboard symbols to the CHIP-8 hex keypad.
///
/// ```text
/// 1 2 3 4      1 2 3 C
/// Q W E R  =>  4 5 6 D
/// A S D F      7 8 9 E
/// Z X C V      A 0 B F
/// ```
pub const KEY_MAP: [(char, u4); KEY_COUNT] = [
    ('1', u4::new(0x1)),
    ('2', u4::new(0x2)),
    ('3', u4::new(0x3)),
    ('4', u4::new(0xC)),
    ('q', u4::new(0x4)),
    ('w', u4::new(0x5)),
    ('e', u4::new(0x6)),
    ('r', u4::new(0xD)),
    ('a', u4::new(0x7)),
    ('s', u4::new(0x8)),
    ('d', u4::new(0x9)),
    ('f', u4::new(0xE)),
    ('z', u4::new(0xA)),
    ('x', u4::new(0x0)),
    ('c', u4::new(0xB)),
    ('v', u4::new(0xF)),
];

/// Looks up the keypad index for a physical symbol. Letters match case-insensitively.
pub fn map_symbol(symbol: char) -> Option<u4> {
    let symbol = symbol.to_ascii_lowercase();
    KEY_MAP
        .iter()
        .find(|(mapped, _)| *mapped == symbol)
        .map(|&(_, key)| key)
}

/// Keypad state: 16 keys mapped as booleans (true = pressed)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    keys: [bool; KEY_COUNT],
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presses the key mapped to `symbol`. Unmapped symbols are ignored.
    pub fn key_down(&mut self, symbol: char) {
        if let Some(key) = map_symbol(symbol) {
            self.keys[key] = true;
        }
    }

    /// Releases the key mapped to `symbol`. Unmapped symbols are ignored.
    pub fn key_up(&mut self, symbol: char) {
        if let Some(key) = map_symbol(symbol) {
            self.keys[key] = false;
        }
    }

    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keys[key] = pressed;
    }

    /// Out-of-range keys are never pressed.
    pub fn is_key_pressed(&self, key: u8) -> bool {
        self.keys.get(key as usize).copied().unwrap_or(false)
    }

    /// Lowest-indexed pressed key, if any.
    pub fn any_key(&self) -> Option<u4> {
        self.keys
            .iter()
            .position(|&pressed| pressed)
            .map(|idx| u4::new(idx as u8))
    }

    pub fn state(&self) -> &[bool; KEY_COUNT] {
        &self.keys
    }

    pub(crate) fn from_state(keys: [bool; KEY_COUNT]) -> Self {
        Self { keys }
    }
}
