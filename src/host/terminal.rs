use std::collections::{HashMap, VecDeque};
use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

use crossterm::{cursor, execute, queue, style, terminal};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use rand::{Rng};
use rand::rngs::{ThreadRng};
use tracing::{debug, warn};

use crate::chip8::{Framebuffer, TIMER_HZ};
use super::{Host, Poll};

/** The CHIP-8 keypad laid over the left-hand side of a QWERTY keyboard. */
pub const KEYMAP: [(char, u8); 16] = [
    ('1', 0x1), ('2', 0x2), ('3', 0x3), ('4', 0xC),
    ('q', 0x4), ('w', 0x5), ('e', 0x6), ('r', 0xD),
    ('a', 0x7), ('s', 0x8), ('d', 0x9), ('f', 0xE),
    ('z', 0xA), ('x', 0x0), ('c', 0xB), ('v', 0xF),
];

/** Terminals report presses but not releases; a key counts as held this long. */
const HOLD: Duration = Duration::from_millis(150);

/** The minimum time between screen updates. */
const FRAME: Duration = Duration::from_millis(1000 / TIMER_HZ);

/** A 60 Hz down-counter. */
#[derive(Debug, Copy, Clone)]
struct Timer {
    value: u8,
    set_at: Instant,
}

impl Timer {
    fn new() -> Self { Timer {value: 0, set_at: Instant::now()} }

    fn set(&mut self, value: u8) {
        self.value = value;
        self.set_at = Instant::now();
    }

    fn get(&self) -> u8 {
        let ticks = self.set_at.elapsed().as_millis() * TIMER_HZ as u128 / 1000;
        (self.value as u128).saturating_sub(ticks) as u8
    }

    /** Discounts `duration` during which the VM was paused. */
    fn pause(&mut self, duration: Duration) {
        self.set_at += duration;
    }
}

/** Keys that control the VM rather than the program. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SystemKey {
    Stop,
    Pause,
}

fn system_key(code: KeyCode, modifiers: KeyModifiers) -> Option<SystemKey> {
    match code {
        KeyCode::Esc => Some(SystemKey::Stop),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(SystemKey::Stop),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(SystemKey::Pause),
        _ => None,
    }
}

//-----------------------------------------------------------------------------

/**
 * A [`Host`] that draws on the terminal using `crossterm`. Each pixel is two
 * character cells wide. Esc stops the VM, and P pauses and resumes it.
 */
pub struct TerminalHost {
    out: Stdout,
    rng: ThreadRng,
    keymap: HashMap<char, u8>,
    last_seen: [Option<Instant>; 16],
    presses: VecDeque<u8>,
    delay: Timer,
    sound: Timer,
    frame: Option<Framebuffer>,
    dirty: bool,
    last_render: Instant,
    active: bool,
    stopped: bool,
    paused: Option<Instant>,
}

impl TerminalHost {
    pub fn new() -> Self {
        TerminalHost {
            out: io::stdout(),
            rng: rand::thread_rng(),
            keymap: HashMap::from(KEYMAP),
            last_seen: [None; 16],
            presses: VecDeque::new(),
            delay: Timer::new(),
            sound: Timer::new(),
            frame: None,
            dirty: false,
            last_render: Instant::now(),
            active: false,
            stopped: false,
            paused: None,
        }
    }

    /** Handles every event that arrives within `timeout`. */
    fn read_events(&mut self, timeout: Duration) -> io::Result<()> {
        let mut timeout = timeout;
        while event::poll(timeout)? {
            timeout = Duration::ZERO;
            if let Event::Key(KeyEvent {code, modifiers}) = event::read()? {
                match (system_key(code, modifiers), code) {
                    (Some(SystemKey::Stop), _) => { self.stopped = true; },
                    (Some(SystemKey::Pause), _) => { self.toggle_pause(); },
                    (None, KeyCode::Char(c)) => {
                        if let Some(&key) = self.keymap.get(&c.to_ascii_lowercase()) {
                            self.last_seen[key as usize] = Some(Instant::now());
                            self.presses.push_back(key);
                        }
                    },
                    _ => {},
                }
            }
        }
        Ok(())
    }

    fn toggle_pause(&mut self) {
        match self.paused.take() {
            Some(since) => {
                let duration = since.elapsed();
                self.delay.pause(duration);
                self.sound.pause(duration);
                debug!(?duration, "resumed");
            },
            None => {
                self.paused = Some(Instant::now());
                debug!("paused");
            },
        }
    }

    fn handle_events(&mut self, timeout: Duration) {
        if let Err(e) = self.read_events(timeout) {
            warn!("cannot read the keyboard: {}", e);
            self.stopped = true;
        }
    }

    fn render(&mut self) -> io::Result<()> {
        let frame = match &self.frame {
            Some(frame) => frame,
            None => return Ok(()),
        };
        queue!(self.out, cursor::MoveTo(0, 0))?;
        for y in 0..frame.height() {
            let line: String = (0..frame.width())
                .map(|x| if frame.pixel(x, y) { "\u{2588}\u{2588}" } else { "  " })
                .collect();
            queue!(self.out, style::Print(line), cursor::MoveToNextLine(1))?;
        }
        self.out.flush()
    }

    /** Redraws the screen if it has changed and a frame time has passed. */
    fn maybe_render(&mut self) {
        if self.dirty && self.last_render.elapsed() >= FRAME {
            if let Err(e) = self.render() {
                warn!("cannot draw the screen: {}", e);
            }
            self.dirty = false;
            self.last_render = Instant::now();
        }
    }
}

impl Default for TerminalHost {
    fn default() -> Self { TerminalHost::new() }
}

impl Drop for TerminalHost {
    fn drop(&mut self) {
        if self.active {
            let _ = execute!(self.out, cursor::Show, terminal::LeaveAlternateScreen);
            let _ = terminal::disable_raw_mode();
        }
    }
}

impl Host for TerminalHost {
    fn random_byte(&mut self) -> u8 { self.rng.gen() }

    fn is_key_pressed(&mut self, key: u8) -> bool {
        self.last_seen[(key & 0xF) as usize].map_or(false, |t| t.elapsed() < HOLD)
    }

    fn wait_for_key_press(&mut self) -> Option<u8> {
        self.presses.clear();
        loop {
            self.maybe_render();
            self.handle_events(FRAME);
            if self.stopped { return None; }
            if self.paused.is_some() { continue; }
            if let Some(key) = self.presses.pop_front() { return Some(key); }
        }
    }

    fn delay_timer(&mut self) -> u8 { self.delay.get() }

    fn set_delay_timer(&mut self, value: u8) { self.delay.set(value); }

    fn set_sound_timer(&mut self, value: u8) {
        self.sound.set(value);
        if value > 1 { debug!(value, "beep"); }
    }

    fn init_framebuffer(&mut self, width: usize, height: usize) -> io::Result<()> {
        let (columns, rows) = terminal::size()?;
        if (columns as usize) < 2 * width || (rows as usize) < height {
            warn!(columns, rows, "the terminal is too small for a {}x{} screen", width, height);
        }
        terminal::enable_raw_mode()?;
        execute!(self.out, terminal::EnterAlternateScreen, cursor::Hide, terminal::Clear(terminal::ClearType::All))?;
        self.active = true;
        Ok(())
    }

    fn blit_framebuffer(&mut self, framebuffer: &Framebuffer) {
        self.frame = Some(framebuffer.clone());
        self.dirty = true;
        self.maybe_render();
    }

    fn poll_host_events(&mut self) -> Poll {
        self.handle_events(Duration::ZERO);
        while self.paused.is_some() && !self.stopped {
            self.handle_events(FRAME);
        }
        self.maybe_render();
        if self.stopped { Poll::Stop } else { Poll::Continue }
    }
}

//-----------------------------------------------------------------------------
