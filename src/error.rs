use thiserror::{Error};

/**
 * A reason why a CHIP-8 program cannot continue. Compiled routines report
 * a `Fault` through [`Op::Trap`] as a pair of `u32`s; see [`encode()`].
 *
 * [`Op::Trap`]: crate::target::Op::Trap
 * [`encode()`]: Self::encode
 */
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("unsupported opcode {word:#06x} at {addr:#05x}")]
    UnsupportedOpcode {addr: u16, word: u16},
    #[error("return to {target:#05x}, which follows no call")]
    IllegalReturn {target: u16},
    #[error("call stack overflow at {addr:#05x}")]
    StackOverflow {addr: u16},
    #[error("return with an empty call stack")]
    StackUnderflow,
    #[error("execution ran off the end of memory at {addr:#05x}")]
    Overrun {addr: u16},
    #[error("stopped by the host")]
    Stopped,
}

const UNSUPPORTED_OPCODE: u32 = 1;
const ILLEGAL_RETURN: u32 = 2;
const STACK_OVERFLOW: u32 = 3;
const STACK_UNDERFLOW: u32 = 4;
const OVERRUN: u32 = 5;
const STOPPED: u32 = 6;

impl Fault {
    /**
     * Packs `self` into a code and an info word. The low 16 bits of the code
     * identify the variant; the high 16 bits carry an instruction word.
     */
    pub fn encode(self) -> (u32, u32) {
        match self {
            Fault::UnsupportedOpcode {addr, word} => (UNSUPPORTED_OPCODE | (word as u32) << 16, addr as u32),
            Fault::IllegalReturn {target} => (ILLEGAL_RETURN, target as u32),
            Fault::StackOverflow {addr} => (STACK_OVERFLOW, addr as u32),
            Fault::StackUnderflow => (STACK_UNDERFLOW, 0),
            Fault::Overrun {addr} => (OVERRUN, addr as u32),
            Fault::Stopped => (STOPPED, 0),
        }
    }

    /** The inverse of [`encode()`](Self::encode). */
    pub fn from_trap(code: u32, info: u32) -> Self {
        let addr = info as u16;
        match code & 0xFFFF {
            UNSUPPORTED_OPCODE => Fault::UnsupportedOpcode {addr, word: (code >> 16) as u16},
            ILLEGAL_RETURN => Fault::IllegalReturn {target: addr},
            STACK_OVERFLOW => Fault::StackOverflow {addr},
            STACK_UNDERFLOW => Fault::StackUnderflow,
            OVERRUN => Fault::Overrun {addr},
            STOPPED => Fault::Stopped,
            _ => panic!("Unknown fault code {:#x}", code),
        }
    }
}

//-----------------------------------------------------------------------------

/** Everything that can go wrong outside a running program. */
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ROM is {len} bytes, but at most {max} fit")]
    RomTooLarge {len: usize, max: usize},
    #[error("font is {len} bytes, but at most {max} fit")]
    FontTooLarge {len: usize, max: usize},
}

pub type Result<T> = std::result::Result<T, Error>;

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn trap_encoding() {
        let faults = [
            Fault::UnsupportedOpcode {addr: 0x2F0, word: 0xF0FF},
            Fault::IllegalReturn {target: 0x123},
            Fault::StackOverflow {addr: 0x204},
            Fault::StackUnderflow,
            Fault::Overrun {addr: 0xFFF},
            Fault::Stopped,
        ];
        for fault in faults {
            let (code, info) = fault.encode();
            assert_eq!(Fault::from_trap(code, info), fault);
        }
    }

    #[test]
    fn messages() {
        assert_eq!(
            Fault::UnsupportedOpcode {addr: 0x200, word: 0x0123}.to_string(),
            "unsupported opcode 0x0123 at 0x200",
        );
        let e: Error = Fault::StackUnderflow.into();
        assert_eq!(e.to_string(), "return with an empty call stack");
        let e = Error::RomTooLarge {len: 5000, max: 3584};
        assert_eq!(e.to_string(), "ROM is 5000 bytes, but at most 3584 fit");
    }
}
