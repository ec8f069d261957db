/*!
 * The world outside the VM: the screen, the keypad, the timers and the
 * random number generator. Compiled routines reach the [`Host`] through
 * [`Devices`], which also owns the [`Framebuffer`].
 */

use tracing::{trace};

use crate::chip8::{Framebuffer};
use crate::error::{Fault};

mod headless;
pub use headless::{HeadlessHost};

pub mod terminal;
pub use terminal::{TerminalHost};

/** What the host wants the VM to do next. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Poll {
    Continue,
    Stop,
}

/** The services a CHIP-8 program needs from its surroundings. */
pub trait Host {
    fn random_byte(&mut self) -> u8;

    /** Tests whether `key` (`0x0` to `0xF`) is held down. */
    fn is_key_pressed(&mut self, key: u8) -> bool;

    /** Blocks until a key is pressed. Returns `None` if the host stops. */
    fn wait_for_key_press(&mut self) -> Option<u8>;

    fn delay_timer(&mut self) -> u8;

    fn set_delay_timer(&mut self, value: u8);

    fn set_sound_timer(&mut self, _value: u8) {}

    /** Prepares to display a screen of the given size in pixels. */
    fn init_framebuffer(&mut self, width: usize, height: usize) -> std::io::Result<()>;

    /** Shows `framebuffer`. Called after every change to it. */
    fn blit_framebuffer(&mut self, framebuffer: &Framebuffer);

    /** Handles pending host events, such as keyboard input. */
    fn poll_host_events(&mut self) -> Poll;

    /** Receives register values written by a routine compiled for debugging. */
    fn debug_byte(&mut self, value: u8) {
        trace!(value, "debug byte");
    }
}

//-----------------------------------------------------------------------------

/**
 * Implements the [`Call`]s made by a compiled routine. Every method that
 * might be inside a busy loop also polls the host, so that the host can stop
 * the VM.
 *
 * [`Call`]: crate::code::Call
 */
pub struct Devices<'a> {
    framebuffer: &'a mut Framebuffer,
    host: &'a mut dyn Host,
}

impl<'a> Devices<'a> {
    pub fn new(framebuffer: &'a mut Framebuffer, host: &'a mut dyn Host) -> Self {
        Devices {framebuffer, host}
    }

    pub fn framebuffer(&self) -> &Framebuffer { &*self.framebuffer }

    fn poll(&mut self) -> Result<(), Fault> {
        match self.host.poll_host_events() {
            Poll::Continue => Ok(()),
            Poll::Stop => Err(Fault::Stopped),
        }
    }

    pub fn clear(&mut self) -> Result<(), Fault> {
        trace!("clear");
        self.framebuffer.clear();
        self.host.blit_framebuffer(&*self.framebuffer);
        self.poll()
    }

    /** Draws `sprite` at `(x, y)`. Returns `true` on collision. */
    pub fn draw(&mut self, x: u8, y: u8, sprite: &[u8]) -> Result<bool, Fault> {
        trace!(x, y, rows = sprite.len(), "draw");
        let collision = self.framebuffer.draw_sprite(x, y, sprite);
        self.host.blit_framebuffer(&*self.framebuffer);
        self.poll()?;
        Ok(collision)
    }

    pub fn random_byte(&mut self) -> Result<u8, Fault> {
        self.poll()?;
        Ok(self.host.random_byte())
    }

    pub fn is_key_pressed(&mut self, key: u8) -> Result<bool, Fault> {
        self.poll()?;
        Ok(self.host.is_key_pressed(key & 0xF))
    }

    pub fn wait_for_key_press(&mut self) -> Result<u8, Fault> {
        let key = self.host.wait_for_key_press().ok_or(Fault::Stopped)?;
        trace!(key, "key press");
        Ok(key)
    }

    pub fn delay_timer(&mut self) -> Result<u8, Fault> {
        self.poll()?;
        Ok(self.host.delay_timer())
    }

    pub fn set_delay_timer(&mut self, value: u8) {
        self.host.set_delay_timer(value);
    }

    pub fn set_sound_timer(&mut self, value: u8) {
        self.host.set_sound_timer(value);
    }

    pub fn debug_byte(&mut self, value: u8) {
        self.host.debug_byte(value);
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn stop() {
        let mut framebuffer = Framebuffer::new();
        let mut host = HeadlessHost::new(0);
        host.stop_after(2);
        let mut devices = Devices::new(&mut framebuffer, &mut host);
        assert_eq!(devices.is_key_pressed(3), Ok(false));
        assert_eq!(devices.draw(0, 0, &[0x80]), Ok(false));
        assert_eq!(devices.random_byte(), Err(Fault::Stopped));
    }

    #[test]
    fn draw_and_clear() {
        let mut framebuffer = Framebuffer::new();
        let mut host = HeadlessHost::new(0);
        {
            let mut devices = Devices::new(&mut framebuffer, &mut host);
            assert_eq!(devices.draw(62, 0, &[0xF0]), Ok(false));
            assert!(devices.framebuffer().pixel(63, 0));
            assert!(devices.framebuffer().pixel(0, 0));
            assert_eq!(devices.draw(0, 0, &[0x80]), Ok(true));
            devices.clear().unwrap();
            assert!(!devices.framebuffer().pixel(63, 0));
        }
        assert_eq!(host.blits(), 3);
        assert_eq!(host.last_frame(), Some(&Framebuffer::new()));
    }

    #[test]
    fn keys() {
        let mut framebuffer = Framebuffer::new();
        let mut host = HeadlessHost::new(0);
        host.hold_key(0x1A);
        host.queue_key_press(7);
        let mut devices = Devices::new(&mut framebuffer, &mut host);
        assert_eq!(devices.is_key_pressed(0xA), Ok(true));
        assert_eq!(devices.is_key_pressed(0xB), Ok(false));
        assert_eq!(devices.wait_for_key_press(), Ok(7));
        assert_eq!(devices.wait_for_key_press(), Err(Fault::Stopped));
    }
}
