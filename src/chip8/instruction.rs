use std::fmt::{Display, Formatter};

use super::register::{RegisterId, RegisterSet, UsageInfo};

/** The classification of a CHIP-8 instruction word. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// 00E0: clear the screen.
    Cls,
    /// 00EE: return from subroutine.
    Rts,
    /// 0NNN: call a machine-code routine. Not supported.
    Sys,
    /// 1NNN: jump.
    Jump,
    /// 2NNN: call subroutine.
    Call,
    /// 3XKK: skip if `VX == KK`.
    Ske,
    /// 4XKK: skip if `VX != KK`.
    Skne,
    /// 5XY0: skip if `VX == VY`.
    Skre,
    /// 6XKK: `VX = KK`.
    Load,
    /// 7XKK: `VX += KK`, no flag.
    Add,
    /// 8XY0: `VX = VY`.
    Move,
    /// 8XY1: `VX |= VY`.
    Or,
    /// 8XY2: `VX &= VY`.
    And,
    /// 8XY3: `VX ^= VY`.
    Xor,
    /// 8XY4: `VX += VY`, `VF = carry`.
    Addr,
    /// 8XY5: `VX -= VY`, `VF = not borrow`.
    Sub,
    /// 8XY6: `VX = VY >> 1`, `VF = shifted out bit`.
    Shr,
    /// 8XY7: `VX = VY - VX`, `VF = not borrow`.
    Subn,
    /// 8XYE: `VX = VY << 1`, `VF = shifted out bit`.
    Shl,
    /// 9XY0: skip if `VX != VY`.
    Skrne,
    /// ANNN: `I = NNN`.
    Loadi,
    /// BNNN: jump to `V0 + NNN`.
    Jumpi,
    /// CXKK: `VX = random & KK`.
    Rand,
    /// DXYN: draw an `N`-row sprite at `(VX, VY)`, `VF = collision`.
    Draw,
    /// EX9E: skip if key `VX` is pressed.
    Skpr,
    /// EXA1: skip if key `VX` is not pressed.
    Skup,
    /// FX07: `VX = delay timer`.
    Moved,
    /// FX0A: wait for a key, `VX = key`.
    Keyd,
    /// FX15: `delay timer = VX`.
    Loadd,
    /// FX18: `sound timer = VX`.
    Loads,
    /// FX1E: `I += VX`.
    Addi,
    /// FX29: point `I` at the font glyph for `VX`.
    Ldspr,
    /// FX33: store the decimal digits of `VX` at `I`.
    Bcd,
    /// FX55: store `V0..=VX` at `I`.
    Stor,
    /// FX65: load `V0..=VX` from `I`.
    Read,
    /// Any other word.
    Unknown,
    /// Synthetic: the walk ran off the end of memory.
    Overrun,
}

/**
 * The decoding of one 16-bit instruction word, or a synthetic control-flow
 * instruction that occupies no bytes.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    /** The undecoded word. Synthetic instructions have the word of their
     * nearest real equivalent. */
    pub raw: u16,
    /** 12-bit address immediate. */
    pub nnn: u16,
    /** First register selector. */
    pub x: u8,
    /** Second register selector. */
    pub y: u8,
    /** 4-bit literal. */
    pub n: u8,
    /** 8-bit literal. */
    pub kk: u8,
    /** The number of bytes occupied: 2, or 0 if synthetic. */
    pub size: u16,
}

/** Decodes `word`. Total: every word has a classification. */
pub fn decode(word: u16) -> Instruction {
    use Opcode::*;
    let x = ((word >> 8) & 0xF) as u8;
    let y = ((word >> 4) & 0xF) as u8;
    let n = (word & 0xF) as u8;
    let kk = (word & 0xFF) as u8;
    let opcode = match word >> 12 {
        0x0 => match word {
            0x00E0 => Cls,
            0x00EE => Rts,
            _ => Sys,
        },
        0x1 => Jump,
        0x2 => Call,
        0x3 => Ske,
        0x4 => Skne,
        0x5 => if n == 0 { Skre } else { Unknown },
        0x6 => Load,
        0x7 => Add,
        0x8 => match n {
            0x0 => Move,
            0x1 => Or,
            0x2 => And,
            0x3 => Xor,
            0x4 => Addr,
            0x5 => Sub,
            0x6 => Shr,
            0x7 => Subn,
            0xE => Shl,
            _ => Unknown,
        },
        0x9 => if n == 0 { Skrne } else { Unknown },
        0xA => Loadi,
        0xB => Jumpi,
        0xC => Rand,
        0xD => Draw,
        0xE => match kk {
            0x9E => Skpr,
            0xA1 => Skup,
            _ => Unknown,
        },
        0xF => match kk {
            0x07 => Moved,
            0x0A => Keyd,
            0x15 => Loadd,
            0x18 => Loads,
            0x1E => Addi,
            0x29 => Ldspr,
            0x33 => Bcd,
            0x55 => Stor,
            0x65 => Read,
            _ => Unknown,
        },
        _ => unreachable!(),
    };
    Instruction {opcode, raw: word, nnn: word & 0xFFF, x, y, n, kk, size: 2}
}

impl Instruction {
    /** An unconditional jump to `target` inserted by the translator. */
    pub fn synthetic_jump(target: u16) -> Self {
        Instruction {size: 0, ..decode(0x1000 | (target & 0xFFF))}
    }

    /** Marks a walk that reached the end of memory. */
    pub fn synthetic_overrun() -> Self {
        Instruction {opcode: Opcode::Overrun, size: 0, ..decode(0)}
    }

    /** Tests whether `self` was inserted by the translator. */
    pub fn is_synthetic(&self) -> bool { self.size == 0 }

    pub fn is_jump(&self) -> bool { self.opcode == Opcode::Jump }

    pub fn is_call(&self) -> bool { self.opcode == Opcode::Call }

    /**
     * Tests whether `self`, located at `addr`, ends a block with no
     * statically known successor: a return, a computed jump, a jump to
     * itself, or the end of memory.
     */
    pub fn is_terminator(&self, addr: u16) -> bool {
        match self.opcode {
            Opcode::Rts | Opcode::Jumpi | Opcode::Overrun => true,
            Opcode::Jump => !self.is_synthetic() && self.nnn == addr,
            _ => false,
        }
    }

    /** Tests whether `self` might skip the following instruction. */
    pub fn is_conditional_skip(&self) -> bool {
        use Opcode::*;
        matches!(self.opcode, Ske | Skne | Skre | Skrne | Skpr | Skup)
    }

    /** Tests whether `self` writes VM memory. */
    pub fn writes_memory(&self) -> bool {
        matches!(self.opcode, Opcode::Bcd | Opcode::Stor)
    }

    fn vx(&self) -> RegisterId { RegisterId::v(self.x) }

    fn vy(&self) -> RegisterId { RegisterId::v(self.y) }

    /**
     * Classifies the registers `self` reads, modifies in place, and
     * overwrites without reading. Diagnostic only.
     */
    pub fn register_usage(&self) -> UsageInfo {
        use Opcode::*;
        let vx = self.vx();
        let vy = self.vy();
        let vf = RegisterId::VF;
        let i = RegisterId::I;
        let none = RegisterSet::empty();
        let one = RegisterSet::single;
        let upto_x = RegisterSet::v_range(self.x);
        match self.opcode {
            Ske | Skne | Skpr | Skup | Loadd | Loads =>
                UsageInfo::new(one(vx), none, none),
            Skre | Skrne =>
                UsageInfo::new(one(vx).with(vy), none, none),
            Load | Rand | Moved | Keyd =>
                UsageInfo::new(none, none, one(vx)),
            Add =>
                UsageInfo::new(none, one(vx), none),
            Move => if self.x == self.y {
                UsageInfo::new(none, none, none)
            } else {
                UsageInfo::new(one(vy), none, one(vx))
            },
            Or | And | Xor => if self.x == self.y {
                UsageInfo::new(none, one(vx), none)
            } else {
                UsageInfo::new(one(vy), one(vx), none)
            },
            Addr | Sub | Subn => if vx == vf {
                // The flag overwrites the result.
                UsageInfo::new(one(vf).with(vy), none, one(vf))
            } else {
                UsageInfo::new(one(vy).without(vx), one(vx), one(vf))
            },
            Shr | Shl =>
                UsageInfo::new(one(vy), none, one(vx).with(vf)),
            Loadi =>
                UsageInfo::new(none, none, one(i)),
            Ldspr =>
                UsageInfo::new(one(vx), none, one(i)),
            Addi =>
                UsageInfo::new(one(vx), one(i), none),
            Jumpi =>
                UsageInfo::new(one(RegisterId::v(0)), none, none),
            Draw =>
                UsageInfo::new(one(vx).with(vy).with(i), none, one(vf)),
            Bcd =>
                UsageInfo::new(one(vx).with(i), none, none),
            Stor =>
                UsageInfo::new(upto_x, one(i), none),
            Read =>
                UsageInfo::new(none, one(i), upto_x),
            Cls | Rts | Sys | Jump | Call | Unknown | Overrun =>
                UsageInfo::new(none, none, none),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        use Opcode::*;
        let (x, y, kk, nnn) = (self.x, self.y, self.kk, self.nnn);
        match self.opcode {
            Cls => write!(f, "CLS"),
            Rts => write!(f, "RET"),
            Sys => write!(f, "SYS {:#05x}", nnn),
            Jump if self.is_synthetic() => write!(f, "JP {:#05x} (synthetic)", nnn),
            Jump => write!(f, "JP {:#05x}", nnn),
            Call => write!(f, "CALL {:#05x}", nnn),
            Ske => write!(f, "SE V{:X}, {:#04x}", x, kk),
            Skne => write!(f, "SNE V{:X}, {:#04x}", x, kk),
            Skre => write!(f, "SE V{:X}, V{:X}", x, y),
            Load => write!(f, "LD V{:X}, {:#04x}", x, kk),
            Add => write!(f, "ADD V{:X}, {:#04x}", x, kk),
            Move => write!(f, "LD V{:X}, V{:X}", x, y),
            Or => write!(f, "OR V{:X}, V{:X}", x, y),
            And => write!(f, "AND V{:X}, V{:X}", x, y),
            Xor => write!(f, "XOR V{:X}, V{:X}", x, y),
            Addr => write!(f, "ADD V{:X}, V{:X}", x, y),
            Sub => write!(f, "SUB V{:X}, V{:X}", x, y),
            Shr => write!(f, "SHR V{:X}, V{:X}", x, y),
            Subn => write!(f, "SUBN V{:X}, V{:X}", x, y),
            Shl => write!(f, "SHL V{:X}, V{:X}", x, y),
            Skrne => write!(f, "SNE V{:X}, V{:X}", x, y),
            Loadi => write!(f, "LD I, {:#05x}", nnn),
            Jumpi => write!(f, "JP V0, {:#05x}", nnn),
            Rand => write!(f, "RND V{:X}, {:#04x}", x, kk),
            Draw => write!(f, "DRW V{:X}, V{:X}, {}", x, y, self.n),
            Skpr => write!(f, "SKP V{:X}", x),
            Skup => write!(f, "SKNP V{:X}", x),
            Moved => write!(f, "LD V{:X}, DT", x),
            Keyd => write!(f, "LD V{:X}, K", x),
            Loadd => write!(f, "LD DT, V{:X}", x),
            Loads => write!(f, "LD ST, V{:X}", x),
            Addi => write!(f, "ADD I, V{:X}", x),
            Ldspr => write!(f, "LD F, V{:X}", x),
            Bcd => write!(f, "LD B, V{:X}", x),
            Stor => write!(f, "LD [I], V{:X}", x),
            Read => write!(f, "LD V{:X}, [I]", x),
            Unknown => write!(f, "DW {:#06x}", self.raw),
            Overrun => write!(f, "OVERRUN"),
        }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn total() {
        for word in 0..=u16::MAX {
            let i = decode(word);
            assert_eq!(i, decode(word));
            assert_eq!(i.raw, word);
            assert_eq!(i.size, 2);
            assert_eq!(i.nnn, word & 0xFFF);
            assert_eq!(i.x as u16, (word >> 8) & 0xF);
            assert_eq!(i.y as u16, (word >> 4) & 0xF);
            assert_eq!(i.n as u16, word & 0xF);
            assert_eq!(i.kk as u16, word & 0xFF);
            assert_ne!(i.opcode, Opcode::Overrun);
            // Every word can be printed and has a usage classification.
            let _ = i.to_string();
            let _ = i.register_usage();
        }
    }

    #[test]
    fn classes() {
        assert_eq!(decode(0x00E0).opcode, Opcode::Cls);
        assert_eq!(decode(0x00EE).opcode, Opcode::Rts);
        assert_eq!(decode(0x0123).opcode, Opcode::Sys);
        assert_eq!(decode(0x5121).opcode, Opcode::Unknown);
        assert_eq!(decode(0x9120).opcode, Opcode::Skrne);
        assert_eq!(decode(0x812E).opcode, Opcode::Shl);
        assert_eq!(decode(0x8128).opcode, Opcode::Unknown);
        assert_eq!(decode(0xE19E).opcode, Opcode::Skpr);
        assert_eq!(decode(0xE1A1).opcode, Opcode::Skup);
        assert_eq!(decode(0xF155).opcode, Opcode::Stor);
        assert_eq!(decode(0xF199).opcode, Opcode::Unknown);
    }

    #[test]
    fn terminators() {
        assert!(decode(0x1200).is_terminator(0x200));
        assert!(!decode(0x1202).is_terminator(0x200));
        assert!(decode(0x00EE).is_terminator(0x200));
        assert!(decode(0xB300).is_terminator(0x200));
        assert!(!decode(0x2300).is_terminator(0x200));
        assert!(!Instruction::synthetic_jump(0x200).is_terminator(0x200));
        assert!(Instruction::synthetic_overrun().is_terminator(0xFFF));
        assert!(decode(0x3000).is_conditional_skip());
        assert!(decode(0xE0A1).is_conditional_skip());
        assert!(!decode(0x6000).is_conditional_skip());
    }

    #[test]
    fn synthetic() {
        let j = Instruction::synthetic_jump(0x345);
        assert!(j.is_jump());
        assert!(j.is_synthetic());
        assert_eq!(j.nnn, 0x345);
        assert_eq!(j.size, 0);
    }

    #[test]
    fn usage_aliasing() {
        // ADD VF, V1: the flag write wins.
        let u = decode(0x8F14).register_usage();
        assert!(u.clobbered.contains(RegisterId::VF));
        assert!(!u.changed.contains(RegisterId::VF));
        assert!(u.read.contains(RegisterId::v(1)));
        // ADD V2, V1.
        let u = decode(0x8214).register_usage();
        assert!(u.changed.contains(RegisterId::v(2)));
        assert!(u.clobbered.contains(RegisterId::VF));
        assert!(u.read.contains(RegisterId::v(1)));
        // LD V3, V3 does nothing.
        assert!(decode(0x8330).register_usage().is_empty());
        // SHR V1, VF reads VF before clobbering it.
        let u = decode(0x81F6).register_usage();
        assert!(u.read.contains(RegisterId::VF));
        assert!(u.clobbered.contains(RegisterId::VF));
        assert!(u.clobbered.contains(RegisterId::v(1)));
        // LD [I], V2.
        let u = decode(0xF255).register_usage();
        assert!(u.read.contains(RegisterId::v(2)));
        assert!(!u.read.contains(RegisterId::v(3)));
        assert!(u.changed.contains(RegisterId::I));
    }
}
