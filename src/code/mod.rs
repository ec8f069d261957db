/*!
 * The instruction set of compiled routines. The code generator expresses
 * CHIP-8 semantics as straight-line [`Action`]s over a small file of
 * [`Register`]s, and expresses control flow through [`Lowerer`].
 *
 * Registers hold 32-bit unsigned values. Every arithmetic result is
 * truncated to its [`Precision`]. Boolean results are `0` or `1`.
 *
 * [`Lowerer`]: crate::target::Lowerer
 */

use std::fmt::{Debug, Formatter};

use super::chip8::{RegisterId};

mod action;
pub use action::{Action, Call};

mod builder;
pub use builder::{Builder};

//-----------------------------------------------------------------------------

/**
 * A local storage slot of a compiled routine. The first 18 mirror the CHIP-8
 * register context; the rest are scratch space for the code generator.
 */
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register(u8);

/** The number of [`Register`]s. */
pub const NUM_REGISTERS: usize = 24;

impl Register {
    /** Holds the full-width intermediate of a flag-producing operation. */
    pub const TEMP: Self = Register(18);
    /** Holds constant operands. Corrupted by [`Builder::const_binary()`]. */
    pub const CONST: Self = Register(19);
    /** Holds computed VM addresses: store targets and exit addresses. */
    pub const ADDR: Self = Register(20);
    /** Set to `1` by a store that overwrites translated code. */
    pub const MODIFIED: Self = Register(21);
    /** Identifies the fault when entering the fatal-error handler. */
    pub const FAULT: Self = Register(22);
    /** The address associated with the fault. */
    pub const FAULT_INFO: Self = Register(23);

    /** The `Register` that mirrors `id`. */
    pub fn vm(id: RegisterId) -> Self { Register(id.as_usize() as u8) }

    /** The `Register` that mirrors `V[index]`. */
    pub fn v(index: u8) -> Self { Self::vm(RegisterId::v(index)) }

    pub fn flag() -> Self { Self::vm(RegisterId::VF) }

    pub fn i() -> Self { Self::vm(RegisterId::I) }

    pub fn sp() -> Self { Self::vm(RegisterId::SP) }

    pub fn as_usize(self) -> usize { self.0 as usize }
}

impl Debug for Register {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match *self {
            Register::TEMP => write!(f, "TEMP"),
            Register::CONST => write!(f, "CONST"),
            Register::ADDR => write!(f, "ADDR"),
            Register::MODIFIED => write!(f, "MODIFIED"),
            Register::FAULT => write!(f, "FAULT"),
            Register::FAULT_INFO => write!(f, "FAULT_INFO"),
            _ => write!(f, "{:?}", RegisterId::all().nth(self.as_usize()).expect("Not a VM register")),
        }
    }
}

//-----------------------------------------------------------------------------

/// Represents the precision of an arithmetic operation.
/// The result is truncated to the given number of bits, and the upper bits
/// of the destination are 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Precision {
    P8 = 0,
    P16 = 1,
    P32 = 2,
}

impl Precision {
    pub fn bits(self) -> u32 { 8 << (self as u32) }

    /** Discards the bits of `x` that do not fit. */
    pub fn truncate(self, x: u32) -> u32 {
        match self {
            Precision::P8 => x & 0xFF,
            Precision::P16 => x & 0xFFFF,
            Precision::P32 => x,
        }
    }
}

/// Unary arithmetic operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnaryOp {
    /// Copy, subject only to truncation.
    Truncate,
    Negate,
    Not,
}

/// Binary arithmetic operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Unsigned division. Division by zero gives zero.
    UDiv,
    /// Unsigned remainder. Division by zero gives zero.
    URem,
    Lsl,
    Lsr,
    And,
    Or,
    Xor,
    Ult,
    Eq,
}

/// The number of bytes transferred by a memory access.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum Width {
    One = 0,
    Two = 1,
}

impl Width {
    pub fn bytes(self) -> usize { 1 << (self as usize) }

    /** The `Width` of a [`RegisterId`] in the register context. */
    pub fn of(id: RegisterId) -> Self {
        if id == RegisterId::I { Width::Two } else { Width::One }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn vm_registers() {
        for id in RegisterId::all() {
            assert_eq!(Register::vm(id).as_usize(), id.as_usize());
        }
        assert_eq!(format!("{:?}", Register::v(0xA)), "VA");
        assert_eq!(format!("{:?}", Register::i()), "I");
        assert_eq!(format!("{:?}", Register::TEMP), "TEMP");
        assert!(Register::FAULT_INFO.as_usize() < NUM_REGISTERS);
    }

    #[test]
    fn precision() {
        assert_eq!(Precision::P8.bits(), 8);
        assert_eq!(Precision::P32.bits(), 32);
        assert_eq!(Precision::P8.truncate(0x1FF), 0xFF);
        assert_eq!(Precision::P16.truncate(0x1_0001), 1);
        assert_eq!(Width::Two.bytes(), 2);
    }
}
