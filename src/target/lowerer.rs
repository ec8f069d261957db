use crate::code::{Register, Action};
use crate::translate::{CodeSet};
use super::{Label, Patch, Op, Routine, Target, UNPATCHED};
use super::label;

/**
 * Assembles [`Op`]s into a growing buffer, resolving forward references
 * through [`Label`]s, and finally packages them as a [`Routine`].
 *
 * Every control-flow op targets exactly one `Label`. If the `Label` is
 * already defined, the op is assembled with its target; otherwise the op
 * is assembled with a placeholder and patched by [`define()`].
 *
 * [`define()`]: Self::define
 */
pub struct Lowerer {
    ops: Vec<Op>,
    tables: Vec<Box<[Option<Target>]>>,
}

impl Lowerer {
    pub fn new() -> Self {
        Lowerer {ops: Vec::new(), tables: Vec::new()}
    }

    /** Returns the current assembly address (an index into the ops). */
    pub fn here(&self) -> Target { self.ops.len() }

    /** Writes `target` into the op at `patch`. */
    fn patch(&mut self, patch: Patch, target: Target) {
        let slot = self.ops[patch.address()].target_mut().expect("Not a control-flow op");
        assert_eq!(*slot, UNPATCHED);
        *slot = target;
    }

    /**
     * Sets the target of `label` to the current assembly address, and writes
     * it into all the ops that jump to `label`.
     */
    pub fn define(&mut self, label: &mut Label) {
        let here = self.here();
        label::define(label, here);
        let patches: Vec<Patch> = label.drain().collect();
        for patch in patches {
            self.patch(patch, here);
        }
    }

    /** Assembles `op`, which targets `label`. */
    fn control_flow(&mut self, op: Op, label: &mut Label) {
        let patch = Patch::new(self.here());
        self.ops.push(op);
        if let Some(target) = label.target() {
            self.patch(patch, target);
        } else {
            label.push(patch);
        }
    }

    /** Assemble an unconditional jump to `label`. */
    pub fn jump(&mut self, label: &mut Label) {
        self.control_flow(Op::Jump(UNPATCHED), label);
    }

    /** Assemble a branch to `label` taken if `(cond != 0) == expected`. */
    pub fn jump_if(&mut self, cond: Register, expected: bool, label: &mut Label) {
        self.control_flow(Op::JumpIf(cond, expected, UNPATCHED), label);
    }

    /**
     * Assemble a dense multi-way branch on `index`. `cases[i]`, if defined,
     * is taken when `index` is `i`. All other values go to `default_`.
     * The `cases` must already be defined.
     */
    pub fn switch(&mut self, index: Register, cases: &[Option<&Label>], default_: &mut Label) {
        let table = cases.iter().map(|case| case.map(|label| {
            label.target().expect("Switch case is not defined")
        })).collect();
        self.tables.push(table);
        let table = self.tables.len() - 1;
        self.control_flow(Op::Switch {index, table, default_: UNPATCHED}, default_);
    }

    /** Assemble `action`. */
    pub fn action(&mut self, action: Action) {
        self.ops.push(Op::Action(action));
    }

    /** Assemble every action in `actions`. */
    pub fn actions(&mut self, actions: impl IntoIterator<Item=Action>) {
        for action in actions { self.action(action); }
    }

    /** Assemble a return to the caller with the value of `result`. */
    pub fn exit(&mut self, result: Register) {
        self.ops.push(Op::Exit(result));
    }

    /** Assemble a failure with the fault encoded in `code` and `info`. */
    pub fn trap(&mut self, code: Register, info: Register) {
        self.ops.push(Op::Trap {code, info});
    }

    /**
     * Packages the ops as a [`Routine`] that starts at `entry`.
     * Panics if any op was never patched.
     */
    pub fn finish(self, entry: &Label, code_set: CodeSet) -> Routine {
        let entry = entry.target().expect("Entry label is not defined");
        let mut ops = self.ops;
        for op in ops.iter_mut() {
            if let Some(&mut target) = op.target_mut() {
                assert_ne!(target, UNPATCHED, "Jump to undefined label");
            }
        }
        Routine::new(ops.into(), self.tables.into(), entry, code_set)
    }
}

impl Default for Lowerer {
    fn default() -> Self { Lowerer::new() }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::chip8::{Memory, Registers, ReturnStack, Framebuffer};
    use crate::code::{Precision, BinaryOp};
    use crate::host::{Devices, HeadlessHost};
    use crate::target::{Environment};
    use Precision::*;

    /** Runs `routine` with fresh state. */
    fn run(routine: &Routine, registers: &mut Registers) -> Result<u16, crate::Fault> {
        let mut memory = Memory::new();
        let mut stack: ReturnStack = Default::default();
        let mut framebuffer = Framebuffer::new();
        let mut host = HeadlessHost::new(0);
        let mut env = Environment {
            memory: &mut memory,
            devices: Devices::new(&mut framebuffer, &mut host),
        };
        routine.execute(registers, &mut stack, &mut env)
    }

    /// Counts `TEMP` down from 5, exiting with the number of iterations.
    #[test]
    fn forward_and_backward() {
        let mut lo = Lowerer::new();
        let mut entry = Label::new();
        let mut done = Label::new();
        let mut top = Label::new();
        lo.define(&mut entry);
        lo.action(Action::Constant(P32, Register::TEMP, 5));
        lo.action(Action::Constant(P32, Register::ADDR, 0));
        lo.action(Action::Constant(P32, Register::CONST, 1));
        lo.define(&mut top);
        lo.jump_if(Register::TEMP, false, &mut done);
        lo.action(Action::Binary(BinaryOp::Sub, P32, Register::TEMP, Register::TEMP, Register::CONST));
        lo.action(Action::Binary(BinaryOp::Add, P32, Register::ADDR, Register::ADDR, Register::CONST));
        lo.jump(&mut top);
        lo.define(&mut done);
        lo.exit(Register::ADDR);
        let routine = lo.finish(&entry, CodeSet::new());
        assert_eq!(run(&routine, &mut Registers::default()), Ok(5));
    }

    #[test]
    fn switch() {
        let mut lo = Lowerer::new();
        let mut entry = Label::new();
        let mut default_ = Label::new();
        let mut one = Label::new();
        let mut three = Label::new();
        lo.define(&mut one);
        lo.action(Action::Constant(P32, Register::ADDR, 0x100));
        lo.exit(Register::ADDR);
        lo.define(&mut three);
        lo.action(Action::Constant(P32, Register::ADDR, 0x300));
        lo.exit(Register::ADDR);
        lo.define(&mut entry);
        lo.action(Action::LoadContext(Register::TEMP, (0, crate::code::Width::One)));
        lo.switch(Register::TEMP, &[None, Some(&one), None, Some(&three)], &mut default_);
        lo.define(&mut default_);
        lo.action(Action::Constant(P32, Register::ADDR, 0xDEF));
        lo.exit(Register::ADDR);
        let routine = lo.finish(&entry, CodeSet::new());
        assert_eq!(routine.num_tables(), 1);
        for (v0, expected) in [(0, 0xDEF), (1, 0x100), (2, 0xDEF), (3, 0x300), (4, 0xDEF), (255, 0xDEF)] {
            let mut registers = Registers::default();
            registers.v[0] = v0;
            assert_eq!(run(&routine, &mut registers), Ok(expected));
        }
    }

    #[test]
    #[should_panic]
    fn undefined_label() {
        let mut lo = Lowerer::new();
        let mut entry = Label::new();
        let mut nowhere = Label::new();
        lo.define(&mut entry);
        lo.jump(&mut nowhere);
        let _ = lo.finish(&entry, CodeSet::new());
    }
}
