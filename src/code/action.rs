use super::{Register, Precision, UnaryOp, BinaryOp, Width};

/// A call from a compiled routine to the host devices.
/// The destination register (where applicable) is on the left.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub enum Call {
    /// Clear the screen.
    Clear,
    /// dest <- collision; draw `rows` bytes of sprite at \[addr] at (x, y).
    Draw {dest: Register, x: Register, y: Register, addr: Register, rows: u8},
    /// dest <- random byte
    Random(Register),
    /// dest <- is key `key` pressed?
    IsKeyPressed(Register, Register),
    /// dest <- the next key pressed. Blocks.
    WaitKey(Register),
    /// dest <- delay timer
    GetDelay(Register),
    /// delay timer <- src
    SetDelay(Register),
    /// sound timer <- src
    SetSound(Register),
    /// Pass `src` to the host's diagnostic byte hook.
    Debug(Register),
}

/// An imperative instruction.
/// The destination register (where applicable) is on the left.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub enum Action {
    /// dest <- src
    Move(Register, Register),
    /// dest <- constant
    Constant(Precision, Register, u32),
    /// dest <- op(src)
    Unary(UnaryOp, Precision, Register, Register),
    /// dest <- op(src1, src2)
    Binary(BinaryOp, Precision, Register, Register, Register),
    /// dest <- \[addr] in VM memory
    Load(Register, (Register, Width)),
    /// \[addr] <- src in VM memory.
    /// If any byte written belongs to the routine's code-set, dest <- 1.
    Store(Register, Register, (Register, Width)),
    /// dest <- the register context at byte `offset`
    LoadContext(Register, (usize, Width)),
    /// the register context at byte `offset` <- src
    StoreContext(Register, (usize, Width)),
    /// dest <- return_stack\[index]
    LoadStack(Register, Register),
    /// return_stack\[index] <- src
    StoreStack(Register, Register),
    /// Call the host devices.
    Call(Call),
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Call::Clear =>
                write!(f, "Clear"),
            Call::Draw {dest, x, y, addr, rows} =>
                write!(f, "Draw {:?}, ({:?}, {:?}), [{:?}], {}", dest, x, y, addr, rows),
            Call::Random(dest) =>
                write!(f, "Random {:?}", dest),
            Call::IsKeyPressed(dest, key) =>
                write!(f, "IsKeyPressed {:?}, {:?}", dest, key),
            Call::WaitKey(dest) =>
                write!(f, "WaitKey {:?}", dest),
            Call::GetDelay(dest) =>
                write!(f, "GetDelay {:?}", dest),
            Call::SetDelay(src) =>
                write!(f, "SetDelay {:?}", src),
            Call::SetSound(src) =>
                write!(f, "SetSound {:?}", src),
            Call::Debug(src) =>
                write!(f, "Debug {:?}", src),
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Move(dest, src) =>
                write!(f, "Move {:?}, {:?}", dest, src),
            Action::Constant(prec, dest, c) =>
                write!(f, "Constant_{:?} {:?}, {:#x}", prec, dest, c),
            Action::Unary(op, prec, dest, src) =>
                write!(f, "{:?}_{:?} {:?}, {:?}", op, prec, dest, src),
            Action::Binary(op, prec, dest, src1, src2) =>
                write!(f, "{:?}_{:?} {:?}, {:?}, {:?}", op, prec, dest, src1, src2),
            Action::Load(dest, (addr, width)) =>
                write!(f, "Load_{:?} {:?}, [{:?}]", width, dest, addr),
            Action::Store(dest, src, (addr, width)) =>
                write!(f, "Store_{:?} {:?}, {:?}, [{:?}]", width, dest, src, addr),
            Action::LoadContext(dest, (offset, width)) =>
                write!(f, "LoadContext_{:?} {:?}, [{}]", width, dest, offset),
            Action::StoreContext(src, (offset, width)) =>
                write!(f, "StoreContext_{:?} {:?}, [{}]", width, src, offset),
            Action::LoadStack(dest, index) =>
                write!(f, "LoadStack {:?}, [{:?}]", dest, index),
            Action::StoreStack(src, index) =>
                write!(f, "StoreStack {:?}, [{:?}]", src, index),
            Action::Call(call) =>
                write!(f, "Call {:?}", call),
        }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn debug_format() {
        let a = Action::Binary(BinaryOp::Add, Precision::P8, Register::v(0), Register::v(0), Register::v(1));
        assert_eq!(format!("{:?}", a), "Add_P8 V0, V0, V1");
        let a = Action::Call(Call::Random(Register::TEMP));
        assert_eq!(format!("{:?}", a), "Call Random TEMP");
        let a = Action::Constant(Precision::P16, Register::i(), 0x2A0);
        assert_eq!(format!("{:?}", a), "Constant_P16 I, 0x2a0");
    }
}
