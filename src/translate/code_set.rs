use crate::chip8::{MEMORY_SIZE};

const WORDS: usize = MEMORY_SIZE / 64;

/** A bitset with one bit per byte of CHIP-8 memory. */
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CodeSet(Box<[u64; WORDS]>);

impl CodeSet {
    pub fn new() -> Self {
        CodeSet(Box::new([0; WORDS]))
    }

    /** Marks `len` bytes starting at `addr`, wrapping at the end of memory. */
    pub fn mark(&mut self, addr: u16, len: u16) {
        for i in 0..len {
            let a = addr.wrapping_add(i) as usize % MEMORY_SIZE;
            self.0[a / 64] |= 1 << (a % 64);
        }
    }

    /** Tests whether the byte at `addr` is marked. */
    pub fn contains(&self, addr: u16) -> bool {
        let a = addr as usize % MEMORY_SIZE;
        self.0[a / 64] & (1 << (a % 64)) != 0
    }

    /** The number of marked bytes. */
    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool { self.count() == 0 }

    /** Yields the marked addresses in increasing order. */
    pub fn iter(&self) -> impl Iterator<Item=u16> + '_ {
        (0..MEMORY_SIZE as u16).filter(move |&a| self.contains(a))
    }
}

impl Default for CodeSet {
    fn default() -> Self { CodeSet::new() }
}

impl std::fmt::Debug for CodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Print as maximal ranges.
        let mut list = f.debug_list();
        let mut start = None;
        for a in 0..=MEMORY_SIZE as u16 {
            let marked = (a as usize) < MEMORY_SIZE && self.contains(a);
            match (start, marked) {
                (None, true) => { start = Some(a); },
                (Some(s), false) => {
                    list.entry(&format_args!("{:#05x}..{:#05x}", s, a));
                    start = None;
                },
                _ => {},
            }
        }
        list.finish()
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn mark() {
        let mut s = CodeSet::new();
        assert!(s.is_empty());
        s.mark(0x200, 4);
        s.mark(0xFFF, 2);
        assert!(s.contains(0x200));
        assert!(s.contains(0x203));
        assert!(!s.contains(0x204));
        assert!(s.contains(0x000));
        assert_eq!(s.count(), 6);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![0x000, 0x200, 0x201, 0x202, 0x203, 0xFFF]);
        assert_eq!(format!("{:?}", s), "[0x000..0x001, 0x200..0x204, 0xfff..0x1000]");
    }
}
