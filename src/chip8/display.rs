use super::{SCREEN_WIDTH, SCREEN_HEIGHT, SCREEN_WIDTH_BYTES};

/**
 * A 1-bit-per-pixel monochrome bitmap, addressed `[byte_column, row]`.
 * The most significant bit of each byte is the leftmost pixel.
 */
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer([[u8; SCREEN_HEIGHT]; SCREEN_WIDTH_BYTES]);

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer([[0; SCREEN_HEIGHT]; SCREEN_WIDTH_BYTES])
    }

    pub fn width(&self) -> usize { SCREEN_WIDTH }

    pub fn height(&self) -> usize { SCREEN_HEIGHT }

    /** The eight pixels at `[column, row]`. */
    pub fn byte(&self, column: usize, row: usize) -> u8 { self.0[column][row] }

    /** Tests whether the pixel at `(x, y)` is lit. */
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.0[x / 8][y] & (0x80 >> (x % 8)) != 0
    }

    pub fn clear(&mut self) {
        *self = Framebuffer::new();
    }

    /** XORs one 8-pixel sprite row into `row` at bit offset `x`, wrapping. */
    fn blit_byte(&mut self, x: usize, row: usize, data: u8) -> bool {
        let shift = x % 8;
        let column0 = x / 8;
        let column1 = (column0 + 1) % SCREEN_WIDTH_BYTES;
        let wide = (data as u16) << (8 - shift);
        let mut collision = false;
        for (column, bits) in [(column0, (wide >> 8) as u8), (column1, wide as u8)] {
            let old = self.0[column][row];
            let new = old ^ bits;
            collision |= old & new != old;
            self.0[column][row] = new;
        }
        collision
    }

    /**
     * XORs `sprite` onto the screen with its top-left pixel at `(x, y)`.
     * The coordinates wrap, and so do rows and columns that fall off the
     * edge. Returns `true` if any lit pixel was turned off.
     */
    pub fn draw_sprite(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
        let x = x as usize % SCREEN_WIDTH;
        let y = y as usize % SCREEN_HEIGHT;
        let mut collision = false;
        for (i, &data) in sprite.iter().enumerate() {
            collision |= self.blit_byte(x, (y + i) % SCREEN_HEIGHT, data);
        }
        collision
    }
}

impl Default for Framebuffer {
    fn default() -> Self { Framebuffer::new() }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                write!(f, "{}", if self.pixel(x, y) { '#' } else { '.' })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn aligned() {
        let mut fb = Framebuffer::new();
        assert!(!fb.draw_sprite(8, 0, &[0xF0]));
        assert_eq!(fb.byte(1, 0), 0xF0);
        assert!(fb.pixel(8, 0));
        assert!(!fb.pixel(12, 0));
        assert!(fb.draw_sprite(8, 0, &[0x80]));
        assert_eq!(fb.byte(1, 0), 0x70);
    }

    #[test]
    fn unaligned_wraps() {
        let mut fb = Framebuffer::new();
        // Straddles the right edge and wraps to column 0.
        assert!(!fb.draw_sprite(60, 31, &[0xFF, 0x81]));
        assert_eq!(fb.byte(7, 31), 0x0F);
        assert_eq!(fb.byte(0, 31), 0xF0);
        assert_eq!(fb.byte(7, 0), 0x08);
        assert_eq!(fb.byte(0, 0), 0x10);
        // Coordinates wrap too.
        assert!(fb.draw_sprite(60 + 64, 31 + 32, &[0x01]));
        assert_eq!(fb.byte(0, 31), 0xE0);
    }

    #[test]
    fn clear() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(3, 4, &[0xAA; 5]);
        assert_ne!(fb, Framebuffer::new());
        fb.clear();
        assert_eq!(fb, Framebuffer::new());
    }
}
