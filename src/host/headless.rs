use std::collections::{VecDeque};

use rand::{Rng, SeedableRng};
use rand_pcg::{Pcg32};

use crate::chip8::{Framebuffer};
use super::{Host, Poll};

/**
 * A [`Host`] with no screen and no keyboard, for tests and batch runs.
 * Randomness is seeded, key presses are scripted, and the delay timer
 * counts down by one on every read.
 */
pub struct HeadlessHost {
    rng: Pcg32,
    held: u16,
    presses: VecDeque<u8>,
    delay: u8,
    sound: u8,
    blits: usize,
    last_frame: Option<Framebuffer>,
    polls: usize,
    poll_limit: Option<usize>,
    debug_bytes: Vec<u8>,
}

impl HeadlessHost {
    pub fn new(seed: u64) -> Self {
        HeadlessHost {
            rng: Pcg32::seed_from_u64(seed),
            held: 0,
            presses: VecDeque::new(),
            delay: 0,
            sound: 0,
            blits: 0,
            last_frame: None,
            polls: 0,
            poll_limit: None,
            debug_bytes: Vec::new(),
        }
    }

    /** Holds down `key` until [`release_key()`](Self::release_key). */
    pub fn hold_key(&mut self, key: u8) { self.held |= 1 << (key & 0xF); }

    pub fn release_key(&mut self, key: u8) { self.held &= !(1 << (key & 0xF)); }

    /** Appends `key` to the keys returned by `wait_for_key_press()`. */
    pub fn queue_key_press(&mut self, key: u8) { self.presses.push_back(key & 0xF); }

    /** Asks the VM to stop on the `limit`-th poll after this one. */
    pub fn stop_after(&mut self, limit: usize) { self.poll_limit = Some(self.polls + limit); }

    /** The number of times the screen was shown. */
    pub fn blits(&self) -> usize { self.blits }

    /** The most recent screen shown. */
    pub fn last_frame(&self) -> Option<&Framebuffer> { self.last_frame.as_ref() }

    pub fn sound_timer(&self) -> u8 { self.sound }

    pub fn debug_bytes(&self) -> &[u8] { &self.debug_bytes }
}

impl Host for HeadlessHost {
    fn random_byte(&mut self) -> u8 { self.rng.gen() }

    fn is_key_pressed(&mut self, key: u8) -> bool { self.held & (1 << (key & 0xF)) != 0 }

    fn wait_for_key_press(&mut self) -> Option<u8> { self.presses.pop_front() }

    fn delay_timer(&mut self) -> u8 {
        let value = self.delay;
        self.delay = self.delay.saturating_sub(1);
        value
    }

    fn set_delay_timer(&mut self, value: u8) { self.delay = value; }

    fn set_sound_timer(&mut self, value: u8) { self.sound = value; }

    fn init_framebuffer(&mut self, _width: usize, _height: usize) -> std::io::Result<()> { Ok(()) }

    fn blit_framebuffer(&mut self, framebuffer: &Framebuffer) {
        self.blits += 1;
        self.last_frame = Some(framebuffer.clone());
    }

    fn poll_host_events(&mut self) -> Poll {
        if self.poll_limit.map_or(false, |limit| self.polls >= limit) {
            return Poll::Stop;
        }
        self.polls += 1;
        Poll::Continue
    }

    fn debug_byte(&mut self, value: u8) { self.debug_bytes.push(value); }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn seeded() {
        let mut a = HeadlessHost::new(42);
        let mut b = HeadlessHost::new(42);
        let xs: Vec<u8> = (0..16).map(|_| a.random_byte()).collect();
        let ys: Vec<u8> = (0..16).map(|_| b.random_byte()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn delay_counts_down() {
        let mut host = HeadlessHost::new(0);
        host.set_delay_timer(2);
        assert_eq!(host.delay_timer(), 2);
        assert_eq!(host.delay_timer(), 1);
        assert_eq!(host.delay_timer(), 0);
        assert_eq!(host.delay_timer(), 0);
    }

    #[test]
    fn held_keys() {
        let mut host = HeadlessHost::new(0);
        host.hold_key(5);
        assert!(host.is_key_pressed(5));
        host.release_key(5);
        assert!(!host.is_key_pressed(5));
    }
}
