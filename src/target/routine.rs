use std::ops::{Index, IndexMut};

use crate::chip8::{Memory, Registers, ReturnStack};
use crate::code::{Register, NUM_REGISTERS, Precision, UnaryOp, BinaryOp, Width, Action, Call};
use crate::error::{Fault};
use crate::host::{Devices};
use crate::translate::{CodeSet};

/** A control-flow target expressed as an index into [`Routine`]'s ops. */
pub type Target = usize;

/** Stands for a [`Target`] that has not been patched yet. */
pub const UNPATCHED: Target = usize::MAX;

/** One instruction of a [`Routine`]. */
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Op {
    /// Perform the action then continue with the next op.
    Action(Action),
    /// Continue at the target.
    Jump(Target),
    /// If `(register != 0) == expected` continue at the target, otherwise
    /// continue with the next op.
    JumpIf(Register, bool, Target),
    /// If `register` is `i` and `i < tables[table].len()` and
    /// `tables[table][i]` is `Some(target)`, continue at `target`.
    /// Otherwise continue at `default_`.
    Switch {index: Register, table: usize, default_: Target},
    /// Return the register's value to the caller.
    Exit(Register),
    /// Fail with the [`Fault`] encoded in the two registers.
    Trap {code: Register, info: Register},
}

impl Op {
    /** The patchable target of `self`, if any. */
    pub fn target_mut(&mut self) -> Option<&mut Target> {
        match self {
            Op::Jump(target) => Some(target),
            Op::JumpIf(_, _, target) => Some(target),
            Op::Switch {default_, ..} => Some(default_),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Action(action) => write!(f, "{:?}", action),
            Op::Jump(target) => write!(f, "Jump {}", target),
            Op::JumpIf(cond, expected, target) => write!(f, "JumpIf {:?} == {}, {}", cond, expected, target),
            Op::Switch {index, table, default_} => write!(f, "Switch {:?}, table {}, default {}", index, table, default_),
            Op::Exit(result) => write!(f, "Exit {:?}", result),
            Op::Trap {code, info} => write!(f, "Trap {:?}, {:?}", code, info),
        }
    }
}

//-----------------------------------------------------------------------------

/** Everything a [`Routine`] touches, other than the registers. */
pub struct Environment<'a> {
    /** The VM memory. */
    pub memory: &'a mut Memory,
    /** The screen, keyboard and timers. */
    pub devices: Devices<'a>,
}

/** The local storage of a running [`Routine`]. */
struct Locals([u32; NUM_REGISTERS]);

impl Index<Register> for Locals {
    type Output = u32;

    fn index(&self, r: Register) -> &u32 { &self.0[r.as_usize()] }
}

impl IndexMut<Register> for Locals {
    fn index_mut(&mut self, r: Register) -> &mut u32 { &mut self.0[r.as_usize()] }
}

//-----------------------------------------------------------------------------

/**
 * An invocable compiled routine: a flat sequence of [`Op`]s with every
 * control-flow target resolved, plus the dense tables used by
 * [`Op::Switch`].
 */
pub struct Routine {
    ops: Box<[Op]>,
    tables: Box<[Box<[Option<Target>]>]>,
    entry: Target,
    code_set: CodeSet,
}

impl Routine {
    /** Called by [`Lowerer::finish()`](super::Lowerer::finish). */
    pub(super) fn new(
        ops: Box<[Op]>,
        tables: Box<[Box<[Option<Target>]>]>,
        entry: Target,
        code_set: CodeSet,
    ) -> Self {
        assert!(entry < ops.len());
        Routine {ops, tables, entry, code_set}
    }

    /** The ops, for inspection. */
    pub fn ops(&self) -> &[Op] { &self.ops }

    /** The number of dispatch tables. */
    pub fn num_tables(&self) -> usize { self.tables.len() }

    /** The addresses whose modification invalidates this routine. */
    pub fn code_set(&self) -> &CodeSet { &self.code_set }

    /**
     * Runs `self` until it exits, and returns the exit value.
     * The routine loads `registers` on entry and stores them on exit.
     */
    pub fn execute(
        &self,
        registers: &mut Registers,
        stack: &mut ReturnStack,
        env: &mut Environment,
    ) -> Result<u16, Fault> {
        let mut r = Locals([0; NUM_REGISTERS]);
        let mut pc = self.entry;
        loop {
            match self.ops[pc] {
                Op::Action(action) => {
                    self.act(action, &mut r, registers, stack, env)?;
                    pc += 1;
                },
                Op::Jump(target) => {
                    pc = target;
                },
                Op::JumpIf(cond, expected, target) => {
                    pc = if (r[cond] != 0) == expected { target } else { pc + 1 };
                },
                Op::Switch {index, table, default_} => {
                    let cases = &self.tables[table];
                    pc = cases.get(r[index] as usize).copied().flatten().unwrap_or(default_);
                },
                Op::Exit(result) => {
                    return Ok(r[result] as u16);
                },
                Op::Trap {code, info} => {
                    return Err(Fault::from_trap(r[code], r[info]));
                },
            }
        }
    }

    fn act(
        &self,
        action: Action,
        r: &mut Locals,
        registers: &mut Registers,
        stack: &mut ReturnStack,
        env: &mut Environment,
    ) -> Result<(), Fault> {
        match action {
            Action::Move(dest, src) => {
                r[dest] = r[src];
            },
            Action::Constant(prec, dest, value) => {
                r[dest] = prec.truncate(value);
            },
            Action::Unary(op, prec, dest, src) => {
                r[dest] = unary_op(op, prec, r[src]);
            },
            Action::Binary(op, prec, dest, src1, src2) => {
                r[dest] = binary_op(op, prec, r[src1], r[src2]);
            },
            Action::Load(dest, (addr, width)) => {
                let addr = r[addr] as u16;
                r[dest] = match width {
                    Width::One => env.memory.byte(addr) as u32,
                    Width::Two => env.memory.word(addr) as u32,
                };
            },
            Action::Store(dest, src, (addr, width)) => {
                let addr = r[addr] as u16;
                let value = r[src];
                match width {
                    Width::One => env.memory.set_byte(addr, value as u8),
                    Width::Two => env.memory.set_word(addr, value as u16),
                }
                let modified = (0..width.bytes() as u16)
                    .any(|i| self.code_set.contains(addr.wrapping_add(i)));
                if modified { r[dest] = 1; }
            },
            Action::LoadContext(dest, (offset, width)) => {
                r[dest] = registers.read(offset, width.bytes()) as u32;
            },
            Action::StoreContext(src, (offset, width)) => {
                registers.write(offset, width.bytes(), r[src] as u16);
            },
            Action::LoadStack(dest, index) => {
                r[dest] = stack[r[index] as usize] as u32;
            },
            Action::StoreStack(src, index) => {
                stack[r[index] as usize] = r[src] as u16;
            },
            Action::Call(call) => {
                self.call(call, r, env)?;
            },
        }
        Ok(())
    }

    fn call(&self, call: Call, r: &mut Locals, env: &mut Environment) -> Result<(), Fault> {
        let devices = &mut env.devices;
        match call {
            Call::Clear => {
                devices.clear()?;
            },
            Call::Draw {dest, x, y, addr, rows} => {
                let mut sprite = [0u8; 16];
                let sprite = &mut sprite[..rows as usize];
                let base = r[addr] as u16;
                for (i, byte) in sprite.iter_mut().enumerate() {
                    *byte = env.memory.byte(base.wrapping_add(i as u16));
                }
                r[dest] = devices.draw(r[x] as u8, r[y] as u8, sprite)? as u32;
            },
            Call::Random(dest) => {
                r[dest] = devices.random_byte()? as u32;
            },
            Call::IsKeyPressed(dest, key) => {
                r[dest] = devices.is_key_pressed(r[key] as u8)? as u32;
            },
            Call::WaitKey(dest) => {
                r[dest] = devices.wait_for_key_press()? as u32;
            },
            Call::GetDelay(dest) => {
                r[dest] = devices.delay_timer()? as u32;
            },
            Call::SetDelay(src) => {
                devices.set_delay_timer(r[src] as u8);
            },
            Call::SetSound(src) => {
                devices.set_sound_timer(r[src] as u8);
            },
            Call::Debug(src) => {
                devices.debug_byte(r[src] as u8);
            },
        }
        Ok(())
    }
}

impl std::fmt::Debug for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "entry: {}", self.entry)?;
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{:5}: {:?}", i, op)?;
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

fn unary_op(op: UnaryOp, prec: Precision, x: u32) -> u32 {
    prec.truncate(match op {
        UnaryOp::Truncate => x,
        UnaryOp::Negate => x.wrapping_neg(),
        UnaryOp::Not => !x,
    })
}

fn binary_op(op: BinaryOp, prec: Precision, x: u32, y: u32) -> u32 {
    prec.truncate(match op {
        BinaryOp::Add => x.wrapping_add(y),
        BinaryOp::Sub => x.wrapping_sub(y),
        BinaryOp::Mul => x.wrapping_mul(y),
        BinaryOp::UDiv => x.checked_div(y).unwrap_or(0),
        BinaryOp::URem => x.checked_rem(y).unwrap_or(0),
        BinaryOp::Lsl => x.checked_shl(y).unwrap_or(0),
        BinaryOp::Lsr => x.checked_shr(y).unwrap_or(0),
        BinaryOp::And => x & y,
        BinaryOp::Or => x | y,
        BinaryOp::Xor => x ^ y,
        BinaryOp::Ult => (x < y) as u32,
        BinaryOp::Eq => (x == y) as u32,
    })
}

//-----------------------------------------------------------------------------
