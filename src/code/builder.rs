/*!
 * A utility for generating straight-line code that understands the CHIP-8
 * register context.
 */

use super::super::chip8::{self, RegisterId};
use super::{Register, Precision, UnaryOp, BinaryOp, Width, Action, Call};
use Precision::*;
use Action::*;

/**
 * Accumulates [`Action`]s.
 *
 * The methods correspond roughly to the cases of type `Action`. They fill in
 * CHIP-8-specific default parameters. `load_register()` and
 * `store_register()` address the register context by field offset.
 */
pub struct Builder(Vec<Action>);

impl Builder {
    pub fn new() -> Self {
        Builder(Vec::new())
    }

    pub fn const_(&mut self, prec: Precision, dest: Register, constant: u32) {
        self.0.push(Constant(prec, dest, constant));
    }

    pub fn move_(&mut self, dest: Register, src: Register) {
        if dest != src {
            self.0.push(Move(dest, src));
        }
    }

    pub fn unary(&mut self, op: UnaryOp, prec: Precision, dest: Register, src: Register) {
        self.0.push(Unary(op, prec, dest, src));
    }

    pub fn binary(&mut self, op: BinaryOp, prec: Precision, dest: Register, src1: Register, src2: Register) {
        self.0.push(Binary(op, prec, dest, src1, src2));
    }

    /**
     * Apply `op` to `src` and `constant`, writing `dest`.
     * `CONST` is corrupted.
     */
    pub fn const_binary(&mut self, op: BinaryOp, prec: Precision, dest: Register, src: Register, constant: u32) {
        assert_ne!(src, Register::CONST);
        self.const_(P32, Register::CONST, constant);
        self.binary(op, prec, dest, src, Register::CONST);
    }

    /** Load a byte of VM memory. */
    pub fn load(&mut self, dest: Register, addr: Register) {
        self.0.push(Load(dest, (addr, Width::One)));
    }

    /** Store a byte of VM memory, recording self-modification in `MODIFIED`. */
    pub fn store(&mut self, src: Register, addr: Register) {
        self.0.push(Store(Register::MODIFIED, src, (addr, Width::One)));
    }

    /** Load `id` from the register context. */
    pub fn load_register(&mut self, id: RegisterId) {
        self.0.push(LoadContext(Register::vm(id), (offset_of(id), Width::of(id))));
    }

    /** Store `id` to the register context. */
    pub fn store_register(&mut self, id: RegisterId) {
        self.0.push(StoreContext(Register::vm(id), (offset_of(id), Width::of(id))));
    }

    pub fn load_stack(&mut self, dest: Register, index: Register) {
        self.0.push(LoadStack(dest, index));
    }

    pub fn store_stack(&mut self, src: Register, index: Register) {
        self.0.push(StoreStack(src, index));
    }

    pub fn call(&mut self, call: Call) {
        self.0.push(Action::Call(call));
    }

    /** Returns all the [`Action`]s that this `Builder` has accumulated. */
    pub fn finish(self) -> Box<[Action]> {
        self.0.into()
    }
}

impl Default for Builder {
    fn default() -> Self { Builder::new() }
}

/** The byte offset of `id` within [`chip8::Registers`]. */
fn offset_of(id: RegisterId) -> usize {
    match id {
        RegisterId::I => chip8::i_offset(),
        RegisterId::SP => chip8::sp_offset(),
        _ => chip8::v_offset(id.as_usize()),
    }
}

//-----------------------------------------------------------------------------
