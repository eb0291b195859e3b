use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{LevelFilter, info};
use ratatui::{
    DefaultTerminal, Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    emu::{
        Chip8Runner, Config, DEFAULT_FRAME_RATE, DEFAULT_OPCODES_PER_SECOND, DISPLAY_X, DISPLAY_Y,
        ExecState, Framebuffer, KEY_COUNT, KEY_MAP, PIXEL_ON, Quirks, STACK_LIMIT, Snapshot,
        SpriteEdge, map_symbol,
    },
    u4,
};

// Key release events are not fired in terminals on Linux.
// To handle this, we implement a timeout after which we consider a key released.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

struct App {
    runner: Chip8Runner,
    framebuffer: Framebuffer,
    save_path: PathBuf,
    status: String,
    key_press_times: [Option<Instant>; KEY_COUNT],
}

impl App {
    fn new(runner: Chip8Runner, save_path: PathBuf) -> Self {
        let framebuffer = *runner.chip8_ref().framebuffer();

        Self {
            runner,
            framebuffer,
            save_path,
            status: "F5 save  F9 load  Esc quit".to_string(),
            key_press_times: [None; KEY_COUNT],
        }
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.runner.is_stopped() {
            let frame_start = Instant::now();

            let frame = self.runner.tick().context("CHIP-8 execution error")?;
            self.framebuffer = frame.framebuffer;
            if frame.beep {
                ring_bell().context("Failed to ring terminal bell")?;
            }

            terminal.draw(|frame| self.draw(frame))?;

            self.check_key_timeout();

            // Handle input for the rest of the frame
            let deadline = frame_start + self.runner.frame_duration();
            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                if !event::poll(remaining)? {
                    break;
                }
                if let Event::Key(key) = event::read()? {
                    self.handle_key_event(key);
                }
            }
        }

        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn check_key_timeout(&mut self) {
        let now = Instant::now();

        for (idx, press_time) in self.key_press_times.iter_mut().enumerate() {
            if let Some(time) = press_time
                && now.duration_since(*time) > KEY_RELEASE_TIMEOUT
            {
                *press_time = None;
                self.runner.set_key(u4::new(idx as u8), false);
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        // Ctrl+C before the key map, 'c' is keypad B
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.runner.stop();
            return;
        }

        match key.code {
            KeyCode::Esc => self.runner.stop(),
            KeyCode::F(5) if key.kind == KeyEventKind::Press => {
                self.status = match self.save_state() {
                    Ok(()) => format!("Saved to {}", self.save_path.display()),
                    Err(e) => format!("{e:#}"),
                };
            }
            KeyCode::F(9) if key.kind == KeyEventKind::Press => {
                self.status = match self.load_state() {
                    Ok(()) => format!("Loaded {}", self.save_path.display()),
                    Err(e) => format!("{e:#}"),
                };
            }
            KeyCode::Char(c) => {
                if let Some(idx) = map_symbol(c) {
                    self.runner.set_key(idx, true);
                    self.key_press_times[usize::from(idx)] = Some(Instant::now());
                }
            }
            _ => {}
        }
    }

    fn save_state(&self) -> anyhow::Result<()> {
        let json = self
            .runner
            .chip8_ref()
            .snapshot()
            .to_json()
            .context("Failed to encode save-state")?;

        if let Some(dir) = self.save_path.parent() {
            fs::create_dir_all(dir).context("Failed to create save directory")?;
        }
        fs::write(&self.save_path, json).context("Failed to write save-state")?;

        info!("Saved state to {}", self.save_path.display());
        Ok(())
    }

    fn load_state(&mut self) -> anyhow::Result<()> {
        let json = fs::read_to_string(&self.save_path).context("Failed to read save-state")?;
        let snapshot = Snapshot::from_json(&json).context("Failed to decode save-state")?;

        let chip8 = self.runner.chip8_mut();
        chip8.restore(&snapshot).context("Failed to restore save-state")?;
        self.framebuffer = *chip8.framebuffer();
        self.key_press_times = [None; KEY_COUNT];

        info!("Loaded state from {}", self.save_path.display());
        Ok(())
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Check if we have enough space
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + 15 + 2;
        const MIN_HEIGHT: u16 = DISPLAY_Y as u16 + 2 + 1 + 2;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let center = area.centered(Constraint::Length(45), Constraint::Length(3));

            Paragraph::new(format!(
                "Terminal is too small ({}x{} min)",
                MIN_WIDTH, MIN_HEIGHT
            ))
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center)
            .block(Block::bordered())
            .render(center, buf);

            return;
        }

        let [left, right] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(15 + 2),
        ])
        .areas(area);

        let [display, status] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 + 2),
            Constraint::Min(1 + 2),
        ])
        .areas(left);

        let [state, registers, keypad, stack] = Layout::vertical([
            Constraint::Length(1 + 2),
            Constraint::Length(11 + 2),
            Constraint::Length(4 + 2),
            Constraint::Min(1 + 2),
        ])
        .areas(right);

        self.render_display(display, buf);
        self.render_status(status, buf);
        self.render_state(state, buf);
        self.render_registers(registers, buf);
        self.render_keypad(keypad, buf);
        self.render_stack(stack, buf);
    }
}

impl App {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let text: Vec<Line> = self
            .framebuffer
            .chunks_exact(DISPLAY_X)
            .map(|row| {
                row.iter()
                    .map(|&pixel| {
                        Span::styled(
                            if pixel == PIXEL_ON { "█" } else { " " },
                            Style::default().fg(Color::Green),
                        )
                    })
                    .collect()
            })
            .collect();

        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Display "))
            .render(area, buf);
    }

    fn render_status(&self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.status.as_str())
            .block(Block::bordered().title(" Status "))
            .render(area, buf);
    }

    fn render_state(&self, area: Rect, buf: &mut Buffer) {
        let (text, color) = match self.runner.chip8_ref().exec_state() {
            ExecState::Running => ("RUNNING", Color::Green),
            ExecState::AwaitingKey(_) => ("KEY WAIT", Color::Yellow),
        };

        Paragraph::new(Text::styled(text, Style::default().fg(color)))
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" State "))
            .render(area, buf);
    }

    fn render_registers(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = self.runner.chip8_ref();
        let mut lines = Vec::new();

        lines.push(Line::from(format!(
            "PC: {:03X}  I: {:03X}",
            chip8.pc(),
            chip8.i()
        )));
        lines.push(Line::from(format!(
            "DT: {:02X}   ST: {:02X}",
            chip8.delay_timer(),
            chip8.sound_timer()
        )));
        lines.push(Line::from(""));

        let v = chip8.v();
        for idx in 0..8 {
            lines.push(Line::from(format!(
                "V{:X}: {:02X}   V{:X}: {:02X}",
                idx,
                v[idx],
                idx + 8,
                v[idx + 8]
            )));
        }

        Paragraph::new(lines)
            .block(Block::bordered().title(" Registers "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let keypad = self.runner.chip8_ref().keyboard().state();

        // KEY_MAP lists the physical keys row by row, four to a row
        let lines: Vec<Line> = KEY_MAP
            .chunks(4)
            .map(|row| {
                let mut spans = Vec::with_capacity(row.len() * 2);
                for (col, &(_, key)) in row.iter().enumerate() {
                    if col > 0 {
                        spans.push(Span::raw(" "));
                    }
                    let style = if keypad[key] {
                        Style::default().fg(Color::Black).bg(Color::White)
                    } else {
                        Style::default()
                    };
                    spans.push(Span::styled(format!("{:X}", key.value()), style));
                }
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }

    /// Return addresses, innermost call on top.
    fn render_stack(&self, area: Rect, buf: &mut Buffer) {
        let stack = self.runner.chip8_ref().stack();
        let rows = usize::from(area.height.saturating_sub(2)).max(1);

        let mut lines: Vec<Line> = stack
            .iter()
            .enumerate()
            .rev()
            .take(rows)
            .map(|(depth, addr)| Line::from(format!("{depth:>2} {addr:#05X}")))
            .collect();

        if lines.is_empty() {
            lines.push(Line::from("Empty"));
        } else if stack.len() > rows {
            // Outermost frames that did not fit
            lines[rows - 1] = Line::from("...");
        }

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(format!(" Stack {}/{} ", stack.len(), STACK_LIMIT)))
            .render(area, buf);
    }
}

fn ring_bell() -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(b"\x07")?;
    stdout.flush()
}

/// Renders the display as text, `#` for lit pixels and `.` for dark ones.
fn framebuffer_to_text(framebuffer: &Framebuffer) -> String {
    framebuffer
        .chunks_exact(DISPLAY_X)
        .map(|row| {
            row.iter()
                .map(|&pixel| if pixel == PIXEL_ON { '#' } else { '.' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn save_path(save_dir: &Path, rom_path: &Path) -> PathBuf {
    let stem = rom_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rom".to_string());

    save_dir.join(format!("{stem}.json"))
}

/// CHIP-8 interpreter for the terminal.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// F5 saves state, F9 restores it, Escape exits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Frame ticks per second
    #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Opcodes executed per second
    #[arg(long, default_value_t = DEFAULT_OPCODES_PER_SECOND)]
    ops_per_second: u32,

    /// Drop sprite pixels past the right edge instead of wrapping them onto the next row
    #[arg(long)]
    clip_sprites: bool,

    /// Run this many frames without the terminal UI, print the display and exit
    #[arg(long, value_name = "N")]
    frames: Option<u32>,

    /// Directory for save-state files
    #[arg(long, default_value = "save")]
    save_dir: PathBuf,

    /// Write log output (filtered by RUST_LOG) to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn logs_to_stderr(&self) -> bool {
        self.log_file.is_none() && self.frames.is_some()
    }

    fn config(&self) -> Config {
        Config {
            frame_rate: self.fps,
            opcodes_per_second: self.ops_per_second,
            quirks: Quirks {
                sprite_edge: if self.clip_sprites {
                    SpriteEdge::Clip
                } else {
                    SpriteEdge::Spill
                },
            },
        }
    }
}

/// Logs go to stderr in headless mode. The terminal UI owns the screen, so
/// there logging is off unless `--log-file` is given.
fn init_logging(args: &Args) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();

    if let Some(path) = &args.log_file {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    } else if !args.logs_to_stderr() {
        builder = env_logger::Builder::new();
        builder.filter_level(LevelFilter::Off);
    }

    builder.init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut runner =
        Chip8Runner::from_config(&args.config()).context("Invalid emulator configuration")?;
    runner
        .load_rom_file(&args.rom_path)
        .context("Failed to load ROM")?;

    if let Some(frames) = args.frames {
        for _ in 0..frames {
            runner.tick().context("CHIP-8 execution error")?;
        }
        println!("{}", framebuffer_to_text(runner.chip8_ref().framebuffer()));
        return Ok(());
    }

    let mut app = App::new(runner, save_path(&args.save_dir, &args.rom_path));

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}
