use log::trace;

use super::{
    Chip8, Chip8Error, Chip8Result, DISPLAY_X, ExecState, FONT_GLYPH_SIZE, FONT_START_ADDRESS,
    FRAMEBUFFER_SIZE, Opcode, OpcodeALU, PIXEL_ON, STACK_LIMIT, SpriteEdge, pixel_index,
};
use crate::u4;

/// Splits a byte into its hundreds, tens and ones digits.
pub fn bcd(value: u8) -> [u8; 3] {
    [value / 100, (value / 10) % 10, value % 10]
}

impl Chip8 {
    /// Executes one decoded opcode. The fetch has already moved PC past it.
    pub fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        match opcode {
            Opcode::ClearDisplay => {
                self.framebuffer.fill(0);
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                if self.stack.len() >= STACK_LIMIT {
                    return Err(Chip8Error::StackOverflow { limit: STACK_LIMIT });
                }
                self.stack.push(self.pc);
                self.pc = nnn;
            }
            Opcode::Return => {
                self.pc = self.stack.pop().ok_or(Chip8Error::StackUnderflow)?;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                self.skip_if(self.v[x] == nn);
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                self.skip_if(self.v[x] != nn);
            }
            Opcode::SkipRegEqualReg { x, y } => {
                self.skip_if(self.v[x] == self.v[y]);
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                self.skip_if(self.v[x] != self.v[y]);
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = rand::random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n)?;
            }
            Opcode::SkipIfPressed { x } => {
                self.skip_if(self.keyboard.is_key_pressed(self.v[x]));
            }
            Opcode::SkipIfNotPressed { x } => {
                self.skip_if(!self.keyboard.is_key_pressed(self.v[x]));
            }
            Opcode::WaitForKey { x } => {
                return Ok(self.execute_wait_for_key(x));
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                let glyph = usize::from(self.v[x]) * FONT_GLYPH_SIZE;
                self.i = (FONT_START_ADDRESS + glyph) as u16;
            }
            Opcode::BCD { x } => {
                self.memory.write_bytes(usize::from(self.i), &bcd(self.v[x]))?;
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                self.memory.write_bytes(usize::from(self.i), &self.v[..count])?;
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let bytes = self.memory.slice(usize::from(self.i), count)?;
                self.v[..count].copy_from_slice(bytes);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::Unknown(opcode) => {
                trace!(
                    "Ignoring unknown opcode {:#06X} at {:#05X}",
                    opcode,
                    self.pc.wrapping_sub(2)
                );
            }
        };

        Ok(Chip8Result::Continue)
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    /// Both operands are read up front, VX is written first and VF last,
    /// so with X = F the flag wins.
    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        let vx = self.v[x];
        let vy = self.v[y];

        let (result, flag) = match op {
            OpcodeALU::Set => (vy, None),
            OpcodeALU::Or => (vx | vy, None),
            OpcodeALU::And => (vx & vy, None),
            OpcodeALU::Xor => (vx ^ vy, None),
            OpcodeALU::Add => {
                let (res, overflow) = vx.overflowing_add(vy);
                (res, Some(u8::from(overflow)))
            }
            OpcodeALU::Sub => {
                let (res, borrow) = vx.overflowing_sub(vy);
                (res, Some(u8::from(!borrow))) // Notice that borrow is inverted
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = vy.overflowing_sub(vx);
                (res, Some(u8::from(!borrow)))
            }
            // Shifts operate on VX in place; VY is not consulted
            OpcodeALU::ShiftRight => (vx >> 1, Some(vx & 0x01)),
            OpcodeALU::ShiftLeft => (vx << 1, Some(vx >> 7)),
        };

        self.v[x] = result;
        if let Some(flag) = flag {
            self.v[0xF] = flag;
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<(), Chip8Error> {
        let x_pos = usize::from(self.v[x]);
        let y_pos = usize::from(self.v[y]);
        let sprite = self.memory.slice(usize::from(self.i), usize::from(n))?;

        let mut any_erased = false;
        for (row, &sprite_byte) in sprite.iter().enumerate() {
            for col in 0..8 {
                if self.quirks.sprite_edge == SpriteEdge::Clip && x_pos + col >= DISPLAY_X {
                    break;
                }

                let index = pixel_index(x_pos + col, y_pos + row);
                if index >= FRAMEBUFFER_SIZE {
                    // Don't draw out of bounds
                    break;
                }

                if sprite_byte & (0x80 >> col) != 0 {
                    let pixel = &mut self.framebuffer[index];
                    if *pixel == PIXEL_ON {
                        any_erased = true;
                    }
                    *pixel ^= PIXEL_ON;
                }
            }
        }

        self.v[0xF] = u8::from(any_erased);
        Ok(())
    }

    fn execute_wait_for_key(&mut self, x: u4) -> Chip8Result {
        if let Some(key) = self.keyboard.any_key() {
            self.v[x] = key.value();
            return Chip8Result::Continue;
        }

        // Park on this instruction until a key shows up
        self.pc = self.pc.wrapping_sub(2);
        self.state = ExecState::AwaitingKey(x);
        Chip8Result::WaitForKey
    }
}
