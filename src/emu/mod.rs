mod chip8;
mod config;
mod execute;
mod font;
mod keyboard;
mod memory;
mod opcode;
mod runner;
mod snapshot;
mod types;

pub use chip8::*;
pub use config::*;
pub use execute::*;
pub use font::*;
pub use keyboard::*;
pub use memory::*;
pub use opcode::*;
pub use runner::*;
pub use snapshot::*;
pub use types::*;
