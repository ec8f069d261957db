use crate::chip8::{Instruction, UsageInfo};

/** Identifies a [`Block`] within its [`BlockList`](super::BlockList). */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(super) usize);

impl BlockId {
    pub fn as_usize(self) -> usize { self.0 }
}

/**
 * A maximal run of straight-line instructions over the address range
 * `[start, end)`.
 *
 * A `Block` begins empty and accumulates instructions until a control-flow
 * instruction finalizes it. After that, the only way it changes is by being
 * split by its `BlockList`.
 */
#[derive(Debug, Clone)]
pub struct Block {
    pub(super) start: u16,
    pub(super) end: u16,
    /** Excludes the terminator. */
    pub(super) instructions: Vec<Instruction>,
    pub(super) terminator: Option<Instruction>,
    /** The no-skip path: the jump target, call target or next instruction. */
    pub(super) successor: Option<BlockId>,
    /** The skip-taken path. Only on conditional skips. */
    pub(super) conditional_successor: Option<BlockId>,
    /** Bookkeeping only. */
    pub(super) predecessors: Vec<BlockId>,
}

impl Block {
    pub fn new(start: u16) -> Self {
        Block {
            start,
            end: start,
            instructions: Vec::new(),
            terminator: None,
            successor: None,
            conditional_successor: None,
            predecessors: Vec::new(),
        }
    }

    pub fn start(&self) -> u16 { self.start }

    pub fn end(&self) -> u16 { self.end }

    pub fn is_empty(&self) -> bool { self.start == self.end && self.terminator.is_none() }

    pub fn is_finalized(&self) -> bool { self.terminator.is_some() }

    /** Tests whether `addr` is in `[start, end)`. */
    pub fn contains(&self, addr: u16) -> bool { self.start <= addr && addr < self.end }

    pub fn instructions(&self) -> &[Instruction] { &self.instructions }

    pub fn terminator(&self) -> Option<&Instruction> { self.terminator.as_ref() }

    pub fn successor(&self) -> Option<BlockId> { self.successor }

    pub fn conditional_successor(&self) -> Option<BlockId> { self.conditional_successor }

    pub fn predecessors(&self) -> &[BlockId] { &self.predecessors }

    /** Tests whether `self` has no successors. */
    pub fn is_leaf(&self) -> bool {
        self.successor.is_none() && self.conditional_successor.is_none()
    }

    /** The address of the terminator. */
    pub fn terminator_addr(&self) -> u16 {
        self.end - self.terminator.map_or(0, |t| t.size)
    }

    /** Yields each instruction with its address, ending with the terminator. */
    pub fn iter(&self) -> impl Iterator<Item=(u16, &Instruction)> {
        let mut addr = self.start;
        self.instructions.iter().chain(self.terminator.iter()).map(move |instruction| {
            let here = addr;
            addr += instruction.size;
            (here, instruction)
        })
    }

    /** Appends a straight-line instruction. */
    pub fn extend(&mut self, instruction: Instruction) {
        assert!(!self.is_finalized());
        self.end += instruction.size;
        self.instructions.push(instruction);
    }

    /** Appends the terminator. Returns the new end address. */
    pub fn finalize(&mut self, terminator: Instruction) -> u16 {
        assert!(!self.is_finalized());
        self.end += terminator.size;
        self.terminator = Some(terminator);
        assert!(self.start < self.end || terminator.is_synthetic(), "Finalized an empty block");
        self.end
    }

    /** The raw words of every real instruction, in order. */
    pub fn words(&self) -> impl Iterator<Item=u16> + '_ {
        self.iter().filter(|(_, i)| !i.is_synthetic()).map(|(_, i)| i.raw)
    }

    /** The combined register usage of the block's instructions. */
    pub fn usage(&self) -> UsageInfo {
        self.iter().fold(UsageInfo::default(), |acc, (_, i)| acc.then(&i.register_usage()))
    }
}

//-----------------------------------------------------------------------------
