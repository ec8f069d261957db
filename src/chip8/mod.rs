/*!
 * The CHIP-8 virtual machine: its constants, its register context and its
 * memory. Nothing in here knows about translation.
 */

use memoffset::{offset_of};

pub mod instruction;
pub use instruction::{Opcode, Instruction, decode};

pub mod register;
pub use register::{RegisterId, RegisterSet, UsageInfo};

pub mod display;
pub use display::{Framebuffer};

/** The size of the CHIP-8 address space, in bytes. */
pub const MEMORY_SIZE: usize = 0x1000;

/** Programs are conventionally loaded here. */
pub const ROM_BASE: u16 = 0x200;

/** The number of entries in the return-address stack. */
pub const STACK_SIZE: usize = 16;

/** The screen width, in pixels. */
pub const SCREEN_WIDTH: usize = 64;

/** The screen height, in pixels. */
pub const SCREEN_HEIGHT: usize = 32;

/** The screen width, in bytes. */
pub const SCREEN_WIDTH_BYTES: usize = SCREEN_WIDTH / 8;

/** The frequency of the delay and sound timers, in Hz. */
pub const TIMER_HZ: u64 = 60;

/** The address of the built-in font. `LD F, Vx` points `I` at `5 * Vx`. */
pub const FONT_ADDR: u16 = 0x000;

/** The number of bytes in one font glyph. */
pub const FONT_GLYPH_SIZE: u16 = 5;

/** The standard hexadecimal font, glyphs `0` to `F`. */
pub const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

//-----------------------------------------------------------------------------

/**
 * The live state of the CHIP-8 registers. This is passed by reference into
 * every compiled routine, which loads every field on entry and stores every
 * field on exit. The routine addresses the fields by byte offset.
 */
#[repr(C)]
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Registers {
    /** The general-purpose registers `V0` to `VF`. `VF` holds flags. */
    pub v: [u8; 16],
    /** The index register. */
    pub i: u16,
    /** The number of entries on the [`ReturnStack`]. */
    pub sp: u8,
    /** Keeps every byte of the struct initialized. */
    pub reserved: u8,
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        f.debug_struct("Registers")
            .field("v", &format!("{:02x?}", self.v))
            .field("i", &format!("{:#x}", self.i))
            .field("sp", &self.sp)
            .finish()
    }
}

/** The byte offset of `V[index]` within [`Registers`]. */
pub fn v_offset(index: usize) -> usize {
    assert!(index < 16);
    offset_of!(Registers, v) + index
}

/** The byte offset of `I` within [`Registers`]. */
pub fn i_offset() -> usize { offset_of!(Registers, i) }

/** The byte offset of `SP` within [`Registers`]. */
pub fn sp_offset() -> usize { offset_of!(Registers, sp) }

impl Registers {
    /** Reads the register of `width` bytes (1 or 2) at byte offset `offset`. */
    pub fn read(&self, offset: usize, width: usize) -> u16 {
        let v = offset_of!(Registers, v);
        match width {
            1 if (v..v + 16).contains(&offset) => self.v[offset - v] as u16,
            1 if offset == sp_offset() => self.sp as u16,
            2 if offset == i_offset() => self.i,
            _ => panic!("No register at offset {} with width {}", offset, width),
        }
    }

    /** Writes the low `width` bytes (1 or 2) of `value` to the register at `offset`. */
    pub fn write(&mut self, offset: usize, width: usize, value: u16) {
        let v = offset_of!(Registers, v);
        match width {
            1 if (v..v + 16).contains(&offset) => { self.v[offset - v] = value as u8; },
            1 if offset == sp_offset() => { self.sp = value as u8; },
            2 if offset == i_offset() => { self.i = value; },
            _ => panic!("No register at offset {} with width {}", offset, width),
        }
    }
}

/** The explicit call stack: return addresses, indexed by [`Registers::sp`]. */
pub type ReturnStack = [u16; STACK_SIZE];

//-----------------------------------------------------------------------------

/** The flat 4KB CHIP-8 address space. */
#[derive(Clone)]
pub struct Memory(Box<[u8; MEMORY_SIZE]>);

impl Memory {
    /** Constructs a zeroed memory with the built-in font installed. */
    pub fn new() -> Self {
        let mut memory = Memory(Box::new([0; MEMORY_SIZE]));
        memory.load(FONT_ADDR, &FONT);
        memory
    }

    /** Copies `bytes` to `addr`. Panics if they do not fit. */
    pub fn load(&mut self, addr: u16, bytes: &[u8]) {
        let start = addr as usize;
        self.0[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /** Reads the byte at `addr`, which wraps at the end of memory. */
    pub fn byte(&self, addr: u16) -> u8 {
        self.0[addr as usize % MEMORY_SIZE]
    }

    /** Writes the byte at `addr`, which wraps at the end of memory. */
    pub fn set_byte(&mut self, addr: u16, value: u8) {
        self.0[addr as usize % MEMORY_SIZE] = value;
    }

    /** Reads the big-endian instruction word at `addr`. */
    pub fn word(&self, addr: u16) -> u16 {
        (self.byte(addr) as u16) << 8 | self.byte(addr.wrapping_add(1)) as u16
    }

    /** Writes the big-endian instruction word at `addr`. */
    pub fn set_word(&mut self, addr: u16, value: u16) {
        self.set_byte(addr, (value >> 8) as u8);
        self.set_byte(addr.wrapping_add(1), value as u8);
    }

    pub fn as_slice(&self) -> &[u8] { &self.0[..] }
}

impl Default for Memory {
    fn default() -> Self { Memory::new() }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "Memory({} bytes)", MEMORY_SIZE)
    }
}

//-----------------------------------------------------------------------------
