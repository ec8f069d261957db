use tracing::{debug, trace};

use crate::chip8::{FONT_ADDR, FONT_GLYPH_SIZE, Opcode, Instruction, RegisterId};
use crate::code::{Register, Precision, BinaryOp, UnaryOp, Call, Builder};
use crate::error::{Fault};
use crate::target::{Label, Lowerer, Routine};
use super::{BlockList, BlockId, Block};
use Precision::*;
use BinaryOp::*;

/** The exit value that means the program halted. */
pub const HALT: u16 = 0;

/**
 * Compiles the blocks of `list` into a [`Routine`] that starts at the block
 * at `entry`. If `debug` is set, every instruction reports the registers it
 * writes through [`Call::Debug`].
 *
 * The routine leaves through one of three stubs, all of which store the
 * register context first:
 *  - The exit stub returns `ADDR`: a VM address at which to continue.
 *  - The halt path returns [`HALT`], after a jump to self.
 *  - The fatal handler traps with the [`Fault`] encoded in `FAULT` and
 *    `FAULT_INFO`.
 */
pub fn generate(list: &BlockList, entry: u16, debug: bool) -> Routine {
    let entry_block = list.block_at(entry).expect("No block at the entry address");
    let mut cg = Codegen::new(list, debug);
    let mut start = Label::new();
    cg.lo.define(&mut start);
    let mut b = Builder::new();
    for id in RegisterId::all() { b.load_register(id); }
    cg.emit(b);
    cg.lo.jump(label(&mut cg.labels, entry_block));
    for (id, block) in list.iter() {
        cg.block(id, block);
    }
    cg.stubs();
    let routine = cg.lo.finish(&start, list.code_set().clone());
    debug!(entry, blocks = list.len(), ops = routine.ops().len(), "generated");
    routine
}

//-----------------------------------------------------------------------------

/** The label of block `id`, created when first needed. */
fn label(labels: &mut [Option<Label>], id: BlockId) -> &mut Label {
    labels[id.as_usize()].get_or_insert_with(Label::new)
}

struct Codegen<'a> {
    list: &'a BlockList,
    debug: bool,
    lo: Lowerer,
    /** Indexed by [`BlockId`]. See [`label()`]. */
    labels: Vec<Option<Label>>,
    exit: Label,
    fatal: Label,
    return_dispatch: Label,
    computed_dispatch: Label,
}

impl<'a> Codegen<'a> {
    fn new(list: &'a BlockList, debug: bool) -> Self {
        Codegen {
            list,
            debug,
            lo: Lowerer::new(),
            labels: (0..list.len()).map(|_| None).collect(),
            exit: Label::new(),
            fatal: Label::new(),
            return_dispatch: Label::new(),
            computed_dispatch: Label::new(),
        }
    }

    fn emit(&mut self, b: Builder) {
        self.lo.actions(b.finish().into_vec());
    }

    fn jump_to_block(&mut self, id: Option<BlockId>) {
        let id = id.expect("Missing successor");
        self.lo.jump(label(&mut self.labels, id));
    }

    /** Sets `FAULT` and `FAULT_INFO` to describe `fault`, and jumps to the fatal handler. */
    fn fault(&mut self, fault: Fault) {
        let (code, info) = fault.encode();
        let mut b = Builder::new();
        b.const_(P32, Register::FAULT, code);
        b.const_(P32, Register::FAULT_INFO, info);
        self.emit(b);
        self.lo.jump(&mut self.fatal);
    }

    /** Sets `ADDR` to `addr` and jumps to the exit stub. */
    fn exit_to(&mut self, addr: u16) {
        let mut b = Builder::new();
        b.const_(P32, Register::ADDR, addr as u32);
        self.emit(b);
        self.lo.jump(&mut self.exit);
    }

    //-------------------------------------------------------------------------

    fn block(&mut self, id: BlockId, block: &Block) {
        trace!(start = block.start(), end = block.end(), "block");
        self.lo.define(label(&mut self.labels, id));
        let terminator_addr = block.terminator_addr();
        for (addr, instruction) in block.iter() {
            if addr == terminator_addr && Some(instruction) == block.terminator() {
                self.terminator(block, addr, instruction);
            } else {
                self.straight(addr, instruction);
            }
        }
    }

    /** Compiles a non-control-flow instruction. */
    fn straight(&mut self, addr: u16, ins: &Instruction) {
        let vx = Register::v(ins.x);
        let vy = Register::v(ins.y);
        let vf = Register::flag();
        let i = Register::i();
        let temp = Register::TEMP;
        let mut b = Builder::new();
        match ins.opcode {
            Opcode::Cls => b.call(Call::Clear),
            Opcode::Load => b.const_(P8, vx, ins.kk as u32),
            Opcode::Add => b.const_binary(Add, P8, vx, vx, ins.kk as u32),
            Opcode::Move => b.move_(vx, vy),
            Opcode::Or => b.binary(Or, P8, vx, vx, vy),
            Opcode::And => b.binary(And, P8, vx, vx, vy),
            Opcode::Xor => b.binary(Xor, P8, vx, vx, vy),
            Opcode::Addr | Opcode::Sub | Opcode::Subn => {
                // The flag comes from the full-width result.
                match ins.opcode {
                    Opcode::Addr => b.binary(Add, P32, temp, vx, vy),
                    Opcode::Sub => b.binary(Sub, P32, temp, vx, vy),
                    _ => b.binary(Sub, P32, temp, vy, vx),
                }
                if vx != vf { b.unary(UnaryOp::Truncate, P8, vx, temp); }
                match ins.opcode {
                    Opcode::Addr => b.const_binary(Lsr, P8, vf, temp, 8),
                    _ => b.const_binary(Ult, P8, vf, temp, 0x100),
                }
            },
            Opcode::Shr | Opcode::Shl => {
                b.move_(temp, vy);
                if ins.opcode == Opcode::Shr {
                    if vx != vf { b.const_binary(Lsr, P8, vx, temp, 1); }
                    b.const_binary(And, P8, vf, temp, 1);
                } else {
                    if vx != vf { b.const_binary(Lsl, P8, vx, temp, 1); }
                    b.const_binary(Lsr, P8, vf, temp, 7);
                }
            },
            Opcode::Loadi => b.const_(P16, i, ins.nnn as u32),
            Opcode::Rand => {
                b.call(Call::Random(temp));
                b.const_binary(And, P8, vx, temp, ins.kk as u32);
            },
            Opcode::Draw => b.call(Call::Draw {dest: vf, x: vx, y: vy, addr: i, rows: ins.n}),
            Opcode::Moved => b.call(Call::GetDelay(vx)),
            Opcode::Keyd => b.call(Call::WaitKey(vx)),
            Opcode::Loadd => b.call(Call::SetDelay(vx)),
            Opcode::Loads => b.call(Call::SetSound(vx)),
            Opcode::Addi => b.binary(Add, P16, i, i, vx),
            Opcode::Ldspr => {
                b.const_binary(And, P32, temp, vx, 0xF);
                b.const_binary(Mul, P16, temp, temp, FONT_GLYPH_SIZE as u32);
                b.const_binary(Add, P16, i, temp, FONT_ADDR as u32);
            },
            Opcode::Bcd => {
                b.const_(P32, Register::MODIFIED, 0);
                b.const_binary(UDiv, P8, temp, vx, 100);
                b.move_(Register::ADDR, i);
                b.store(temp, Register::ADDR);
                b.const_binary(UDiv, P8, temp, vx, 10);
                b.const_binary(URem, P8, temp, temp, 10);
                b.const_binary(Add, P16, Register::ADDR, i, 1);
                b.store(temp, Register::ADDR);
                b.const_binary(URem, P8, temp, vx, 10);
                b.const_binary(Add, P16, Register::ADDR, i, 2);
                b.store(temp, Register::ADDR);
            },
            Opcode::Stor | Opcode::Read => {
                if ins.opcode == Opcode::Stor { b.const_(P32, Register::MODIFIED, 0); }
                for k in 0..=ins.x {
                    b.const_binary(Add, P16, Register::ADDR, i, k as u32);
                    if ins.opcode == Opcode::Stor {
                        b.store(Register::v(k), Register::ADDR);
                    } else {
                        b.load(Register::v(k), Register::ADDR);
                    }
                }
                b.const_binary(Add, P16, i, i, ins.x as u32 + 1);
            },
            Opcode::Sys | Opcode::Unknown => {
                self.fault(Fault::UnsupportedOpcode {addr, word: ins.raw});
                return;
            },
            _ => panic!("Not a straight-line instruction: {}", ins),
        }
        if self.debug {
            for id in ins.register_usage().exit_saves().iter() {
                if id != RegisterId::I && id != RegisterId::SP {
                    b.call(Call::Debug(Register::vm(id)));
                }
            }
        }
        self.emit(b);
        if ins.writes_memory() {
            // Leave if the store overwrote translated code.
            let mut unmodified = Label::new();
            self.lo.jump_if(Register::MODIFIED, false, &mut unmodified);
            self.exit_to(addr.wrapping_add(2));
            self.lo.define(&mut unmodified);
        }
    }

    /** Compiles the control-flow instruction that ends `block`. */
    fn terminator(&mut self, block: &Block, addr: u16, ins: &Instruction) {
        let vx = Register::v(ins.x);
        let temp = Register::TEMP;
        let mut b = Builder::new();
        let expected = match ins.opcode {
            Opcode::Jump => {
                if block.successor().is_none() {
                    // A jump to self.
                    self.exit_to(HALT);
                } else {
                    self.jump_to_block(block.successor());
                }
                return;
            },
            Opcode::Call => {
                let mut room = Label::new();
                b.const_binary(Ult, P32, temp, Register::sp(), crate::chip8::STACK_SIZE as u32);
                self.emit(b);
                self.lo.jump_if(temp, true, &mut room);
                self.fault(Fault::StackOverflow {addr});
                self.lo.define(&mut room);
                let mut b = Builder::new();
                b.const_(P32, Register::ADDR, addr as u32 + 2);
                b.store_stack(Register::ADDR, Register::sp());
                b.const_binary(Add, P8, Register::sp(), Register::sp(), 1);
                self.emit(b);
                self.jump_to_block(block.successor());
                return;
            },
            Opcode::Rts => {
                self.lo.jump(&mut self.return_dispatch);
                return;
            },
            Opcode::Jumpi => {
                b.const_binary(Add, P32, Register::ADDR, Register::v(0), ins.nnn as u32);
                b.const_binary(And, P32, Register::ADDR, Register::ADDR, 0xFFF);
                self.emit(b);
                self.lo.jump(&mut self.computed_dispatch);
                return;
            },
            Opcode::Overrun => {
                self.fault(Fault::Overrun {addr});
                return;
            },
            Opcode::Ske => { b.const_binary(Eq, P32, temp, vx, ins.kk as u32); true },
            Opcode::Skne => { b.const_binary(Eq, P32, temp, vx, ins.kk as u32); false },
            Opcode::Skre => { b.binary(Eq, P32, temp, vx, Register::v(ins.y)); true },
            Opcode::Skrne => { b.binary(Eq, P32, temp, vx, Register::v(ins.y)); false },
            Opcode::Skpr => { b.call(Call::IsKeyPressed(temp, vx)); true },
            Opcode::Skup => { b.call(Call::IsKeyPressed(temp, vx)); false },
            _ => panic!("Not a terminator: {}", ins),
        };
        self.emit(b);
        let skipped = block.conditional_successor().expect("Missing skip successor");
        self.lo.jump_if(temp, expected, label(&mut self.labels, skipped));
        self.jump_to_block(block.successor());
    }

    //-------------------------------------------------------------------------

    /** Compiles the code shared by all blocks. Must follow every block. */
    fn stubs(&mut self) {
        // Exit.
        self.lo.define(&mut self.exit);
        let mut b = Builder::new();
        for id in RegisterId::all() { b.store_register(id); }
        self.emit(b);
        self.lo.exit(Register::ADDR);
        // Fatal.
        self.lo.define(&mut self.fatal);
        let mut b = Builder::new();
        for id in RegisterId::all() { b.store_register(id); }
        self.emit(b);
        self.lo.trap(Register::FAULT, Register::FAULT_INFO);
        if self.return_dispatch.is_used() { self.return_dispatcher(); }
        if self.computed_dispatch.is_used() { self.computed_dispatcher(); }
    }

    /** Pops a return address and dispatches it through the jump table. */
    fn return_dispatcher(&mut self) {
        let temp = Register::TEMP;
        let sp = Register::sp();
        self.lo.define(&mut self.return_dispatch);
        let mut b = Builder::new();
        b.const_binary(Sub, P32, temp, sp, 1);
        b.const_binary(Ult, P32, Register::ADDR, temp, crate::chip8::STACK_SIZE as u32);
        self.emit(b);
        let mut underflow = Label::new();
        self.lo.jump_if(Register::ADDR, false, &mut underflow);
        let mut b = Builder::new();
        b.unary(UnaryOp::Truncate, P8, sp, temp);
        b.load_stack(Register::ADDR, sp);
        self.emit(b);
        let size = self.list.jump_table().map(|(_, b)| b.start() as usize + 1).max().unwrap_or(0);
        let mut table: Vec<Option<&Label>> = vec![None; size];
        for (id, block) in self.list.jump_table() {
            table[block.start() as usize] = self.labels[id.as_usize()].as_ref();
        }
        let mut illegal = Label::new();
        self.lo.switch(Register::ADDR, &table, &mut illegal);
        self.lo.define(&mut illegal);
        let mut b = Builder::new();
        b.move_(Register::FAULT_INFO, Register::ADDR);
        b.const_(P32, Register::FAULT, Fault::IllegalReturn {target: 0}.encode().0);
        self.emit(b);
        self.lo.jump(&mut self.fatal);
        self.lo.define(&mut underflow);
        self.fault(Fault::StackUnderflow);
    }

    /**
     * Dispatches `ADDR` to the block that starts there, or exits with
     * `ADDR` if there is none.
     */
    fn computed_dispatcher(&mut self) {
        self.lo.define(&mut self.computed_dispatch);
        let size = self.list.iter().map(|(_, b)| b.start() as usize + 1).max().unwrap_or(0);
        let mut table: Vec<Option<&Label>> = vec![None; size];
        for (id, block) in self.list.iter() {
            table[block.start() as usize] = self.labels[id.as_usize()].as_ref();
        }
        self.lo.switch(Register::ADDR, &table, &mut self.exit);
    }
}

//-----------------------------------------------------------------------------
