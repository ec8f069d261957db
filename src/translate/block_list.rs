use std::fmt::{Write};
use std::hash::{Hash, Hasher};
use std::ops::{Index};

use tracing::{trace};

use crate::chip8::{MEMORY_SIZE, Memory, Instruction, decode};
use super::{Block, BlockId, CodeSet};

/** The outcome of [`BlockList::resolve()`]. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolved {
    /** A block already started at the address. */
    Existing(BlockId),
    /** `head` was split, and `tail` starts at the address. */
    Split {head: BlockId, tail: BlockId},
    /** A new empty block was inserted. It needs walking. */
    Created(BlockId),
}

impl Resolved {
    /** The block that starts at the address. */
    pub fn id(self) -> BlockId {
        match self {
            Resolved::Existing(id) => id,
            Resolved::Split {tail, ..} => tail,
            Resolved::Created(id) => id,
        }
    }

    pub fn is_created(self) -> bool { matches!(self, Resolved::Created(_)) }
}

//-----------------------------------------------------------------------------

/**
 * The discovered control-flow graph of one translation unit.
 *
 * Blocks live in an arena indexed by [`BlockId`]; edges are `BlockId`s. The
 * list also keeps the blocks sorted by start address, the sorted subset of
 * blocks that are legal targets of a subroutine return, and the set of
 * memory addresses that were decoded as instructions.
 */
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    blocks: Vec<Block>,
    order: Vec<BlockId>,
    jump_table: Vec<BlockId>,
    code_set: CodeSet,
}

impl BlockList {
    pub fn new() -> Self { Self::default() }

    /** The number of blocks. */
    pub fn len(&self) -> usize { self.blocks.len() }

    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /** Yields the blocks in address order. */
    pub fn iter(&self) -> impl Iterator<Item=(BlockId, &Block)> {
        self.order.iter().map(move |&id| (id, &self.blocks[id.0]))
    }

    /** Yields the jump-table entries in address order. */
    pub fn jump_table(&self) -> impl Iterator<Item=(BlockId, &Block)> {
        self.jump_table.iter().map(move |&id| (id, &self.blocks[id.0]))
    }

    pub fn is_jump_table_entry(&self, id: BlockId) -> bool {
        self.jump_table.contains(&id)
    }

    /** Every address that was decoded as part of an instruction. */
    pub fn code_set(&self) -> &CodeSet { &self.code_set }

    /** The index into `order` of the first block starting at or after `addr`. */
    fn lower_bound(&self, addr: u16) -> usize {
        self.order.partition_point(|&id| self.blocks[id.0].start < addr)
    }

    /** The block starting exactly at `addr`, if any. */
    pub fn block_at(&self, addr: u16) -> Option<BlockId> {
        let pos = self.lower_bound(addr);
        self.order.get(pos).copied().filter(|&id| self.blocks[id.0].start == addr)
    }

    /** The block whose range strictly contains `addr`, if any. */
    fn block_containing(&self, addr: u16) -> Option<BlockId> {
        let pos = self.lower_bound(addr);
        if pos == 0 { return None; }
        let id = self.order[pos - 1];
        if self.blocks[id.0].contains(addr) { Some(id) } else { None }
    }

    /** Adds `block` to the arena and to `order` at `pos`. */
    fn insert(&mut self, pos: usize, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        self.order.insert(pos, id);
        id
    }

    //-------------------------------------------------------------------------

    /**
     * Finds or makes a block starting at `addr`. If `addr` is in the middle
     * of a finalized block, splits it. If `addr` is in the middle of an
     * instruction, makes a new block that overlaps the old one.
     */
    pub fn resolve(&mut self, addr: u16) -> Resolved {
        if let Some(id) = self.block_at(addr) {
            return Resolved::Existing(id);
        }
        if let Some(head) = self.block_containing(addr) {
            if self.blocks[head.0].iter().any(|(a, _)| a == addr) {
                let tail = self.split(head, addr);
                return Resolved::Split {head, tail};
            }
            trace!(addr, "misaligned target");
        }
        let pos = self.lower_bound(addr);
        Resolved::Created(self.insert(pos, Block::new(addr)))
    }

    /**
     * Splits finalized block `head` at `addr`, which must be the address of
     * one of its instructions other than the first. The new tail block takes
     * the instructions from `addr` onwards, the terminator and the successor
     * edges. `head` is re-terminated with a synthetic jump to the tail.
     * Returns the tail.
     */
    pub fn split(&mut self, head: BlockId, addr: u16) -> BlockId {
        let tail_id = BlockId(self.blocks.len());
        let old = &mut self.blocks[head.0];
        assert!(old.is_finalized(), "Split an unfinalized block");
        assert!(old.start < addr && addr < old.end);
        let k = old.iter().position(|(a, _)| a == addr).expect("Split inside an instruction");
        let mut tail = Block::new(addr);
        tail.end = old.end;
        tail.instructions = old.instructions.split_off(k);
        tail.terminator = old.terminator;
        tail.successor = old.successor.take();
        tail.conditional_successor = old.conditional_successor.take();
        tail.predecessors = vec![head];
        old.end = addr;
        old.terminator = Some(Instruction::synthetic_jump(addr));
        old.successor = Some(tail_id);
        trace!(head = old.start, tail = addr, "split");
        // The successors' edges now come from the tail.
        for succ in [tail.successor, tail.conditional_successor].into_iter().flatten() {
            let predecessors = if succ == head { &mut tail.predecessors } else { &mut self.blocks[succ.0].predecessors };
            if let Some(p) = predecessors.iter_mut().rev().find(|p| **p == head) {
                *p = tail_id;
            }
        }
        let pos = self.lower_bound(addr);
        let id = self.insert(pos, tail);
        assert_eq!(id, tail_id);
        tail_id
    }

    /** Records an edge from `from` to `to`. */
    fn link(&mut self, from: BlockId, conditional: bool, to: BlockId) {
        let block = &mut self.blocks[from.0];
        let slot = if conditional { &mut block.conditional_successor } else { &mut block.successor };
        assert!(slot.is_none(), "Block already has a successor");
        *slot = Some(to);
        self.blocks[to.0].predecessors.push(from);
    }

    /**
     * Resolves `addr` and records it as a successor of `from`. If `from`
     * itself gets split, its terminator moves to the tail, and so `from` is
     * updated. Returns the successor and whether it is new.
     */
    fn add_successor(&mut self, from: &mut BlockId, conditional: bool, addr: u16) -> (BlockId, bool) {
        let resolved = self.resolve(addr);
        if let Resolved::Split {head, tail} = resolved {
            if head == *from { *from = tail; }
        }
        self.link(*from, conditional, resolved.id());
        (resolved.id(), resolved.is_created())
    }

    /**
     * Registers `addr` as a legal target of a subroutine return.
     * Returns the block and whether it is new.
     */
    pub fn add_jump_table_entry(&mut self, addr: u16) -> (BlockId, bool) {
        let resolved = self.resolve(addr);
        let id = resolved.id();
        let start = self.blocks[id.0].start;
        let pos = self.jump_table.partition_point(|&j| self.blocks[j.0].start < start);
        if self.jump_table.get(pos) != Some(&id) {
            self.jump_table.insert(pos, id);
        }
        (id, resolved.is_created())
    }

    //-------------------------------------------------------------------------

    /**
     * Walks the code reachable from `start`, adding blocks and edges. Stops
     * at code that has already been walked.
     */
    pub fn discover(&mut self, memory: &Memory, start: u16) {
        let root = self.resolve(start);
        if root.is_created() { self.walk(memory, root.id()); }
    }

    /**
     * Registers `addr` as a jump-table entry, as a call would, and walks the
     * code reachable from it. Used for return addresses pushed by code
     * outside the unit.
     */
    pub fn discover_return(&mut self, memory: &Memory, addr: u16) {
        let (id, created) = self.add_jump_table_entry(addr);
        if created { self.walk(memory, id); }
    }

    /** Walks the new block `root` and everything it leads to. */
    fn walk(&mut self, memory: &Memory, root: BlockId) {
        let mut pending = Vec::new();
        let mut cursor = Some(root);
        while let Some(id) = cursor {
            cursor = self.step(memory, id, &mut pending);
        }
    }

    /** Pops `pending` until it finds a block that has not been walked. */
    fn pop(&self, pending: &mut Vec<BlockId>) -> Option<BlockId> {
        while let Some(id) = pending.pop() {
            if self.blocks[id.0].is_empty() { return Some(id); }
        }
        None
    }

    /** Walks one instruction of block `id`. Returns the block to walk next. */
    fn step(&mut self, memory: &Memory, id: BlockId, pending: &mut Vec<BlockId>) -> Option<BlockId> {
        let addr = self.blocks[id.0].end;
        if let Some(next) = self.block_at(addr).filter(|&next| next != id) {
            // Ran into a block that is already known.
            self.blocks[id.0].finalize(Instruction::synthetic_jump(addr));
            self.link(id, false, next);
            return if self.blocks[next.0].is_empty() { Some(next) } else { self.pop(pending) };
        }
        if addr as usize + 2 > MEMORY_SIZE {
            self.blocks[id.0].finalize(Instruction::synthetic_overrun());
            return self.pop(pending);
        }
        let instruction = decode(memory.word(addr));
        self.code_set.mark(addr, instruction.size);
        trace!(addr, %instruction, "decoded");
        let mut from = id;
        if instruction.is_call() {
            let ret = self.blocks[id.0].finalize(instruction);
            let (entry, created) = self.add_jump_table_entry(ret);
            if created { pending.push(entry); }
            let (target, created) = self.add_successor(&mut from, false, instruction.nnn);
            if created { Some(target) } else { self.pop(pending) }
        } else if instruction.is_terminator(addr) {
            self.blocks[id.0].finalize(instruction);
            self.pop(pending)
        } else if instruction.is_jump() || instruction.is_conditional_skip() {
            let end = self.blocks[id.0].finalize(instruction);
            let target = if instruction.is_conditional_skip() {
                let (skipped, created) = self.add_successor(&mut from, true, end + 2);
                if created { pending.push(skipped); }
                end
            } else {
                instruction.nnn
            };
            let (target, created) = self.add_successor(&mut from, false, target);
            if created { Some(target) } else { self.pop(pending) }
        } else {
            self.blocks[id.0].extend(instruction);
            Some(id)
        }
    }

    //-------------------------------------------------------------------------

    /** The cache key of the unit discovered from `base` and `entry`. */
    pub fn fingerprint(&self, base: u16, entry: u16) -> Fingerprint {
        Fingerprint {
            base,
            entry,
            ranges: self.iter().map(|(_, b)| (b.start, b.end)).collect(),
            words: self.iter().flat_map(|(_, b)| b.words()).collect(),
            returns: self.jump_table().map(|(_, b)| b.start).collect(),
        }
    }

    /** Renders the graph in Graphviz "dot" format. */
    pub fn to_dot(&self) -> String {
        let mut s = String::new();
        let name = |b: &Block| format!("b_{:03x}", b.start);
        writeln!(s, "digraph blocks {{").unwrap();
        writeln!(s, "  node [shape=box fontname=\"monospace\"];").unwrap();
        for (id, block) in self.iter() {
            let mut label = format!("{:#05x}..{:#05x}\\l", block.start, block.end);
            for (addr, instruction) in block.iter() {
                write!(label, "{:03x}: {}\\l", addr, instruction).unwrap();
            }
            let usage = block.usage();
            if !usage.is_empty() {
                write!(label, "read {:?} changed {:?} clobbered {:?}\\l", usage.read, usage.changed, usage.clobbered).unwrap();
            }
            let peripheries = if self.is_jump_table_entry(id) { 2 } else { 1 };
            writeln!(s, "  {} [label=\"{}\" peripheries={}];", name(block), label, peripheries).unwrap();
            if let Some(succ) = block.successor {
                writeln!(s, "  {} -> {};", name(block), name(&self[succ])).unwrap();
            }
            if let Some(succ) = block.conditional_successor {
                writeln!(s, "  {} -> {} [style=dashed];", name(block), name(&self[succ])).unwrap();
            }
        }
        writeln!(s, "}}").unwrap();
        s
    }
}

impl Index<BlockId> for BlockList {
    type Output = Block;

    fn index(&self, id: BlockId) -> &Block { &self.blocks[id.0] }
}

//-----------------------------------------------------------------------------

/**
 * Identifies the code of a translation unit: its base and entry addresses,
 * its block ranges, its instruction words and its jump-table entries. Two units with equal
 * `Fingerprint`s compile to equivalent routines.
 *
 * [`Hash`] uses only [`content_hash()`]; equality compares everything.
 *
 * [`content_hash()`]: Self::content_hash
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub base: u16,
    pub entry: u16,
    pub ranges: Box<[(u16, u16)]>,
    pub words: Box<[u16]>,
    pub returns: Box<[u16]>,
}

impl Fingerprint {
    /** The XOR of the instruction words, alongside the base and entry. */
    pub fn content_hash(&self) -> u64 {
        let fold = self.words.iter().fold(0u16, |acc, &w| acc ^ w);
        (fold as u64) | (self.base as u64) << 16 | (self.entry as u64) << 32
    }
}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.content_hash());
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::{Pcg64};
    use crate::chip8::{Opcode, ROM_BASE};

    /** Constructs a `Memory` with `words` at `ROM_BASE`. */
    pub fn program(words: &[u16]) -> Memory {
        let mut memory = Memory::new();
        for (i, &w) in words.iter().enumerate() {
            memory.set_word(ROM_BASE + 2 * i as u16, w);
        }
        memory
    }

    fn discover(words: &[u16]) -> BlockList {
        let mut list = BlockList::new();
        list.discover(&program(words), ROM_BASE);
        check_invariants(&list);
        list
    }

    fn at(list: &BlockList, addr: u16) -> BlockId {
        list.block_at(addr).expect("No block")
    }

    /** Checks the structural invariants of an aligned `BlockList`. */
    pub fn check_invariants(list: &BlockList) {
        let mut covered = CodeSet::new();
        let mut prev_end = 0;
        for (id, b) in list.iter() {
            assert!(b.is_finalized(), "{:?} not finalized", id);
            assert!(b.start >= prev_end, "{:?} overlaps", id);
            prev_end = b.end;
            covered.mark(b.start, b.end - b.start);
            let size: u16 = b.iter().map(|(_, i)| i.size).sum();
            assert_eq!(b.start + size, b.end);
            for succ in [b.successor, b.conditional_successor].into_iter().flatten() {
                assert!(list[succ].predecessors.contains(&id));
            }
            for &pred in &b.predecessors {
                let p = &list[pred];
                assert!(p.successor == Some(id) || p.conditional_successor == Some(id));
            }
        }
        assert_eq!(&covered, list.code_set());
    }

    #[test]
    fn straight_line() {
        let list = discover(&[0x6005, 0x610A, 0x8014, 0x1206]);
        assert_eq!(list.len(), 1);
        let b = &list[at(&list, 0x200)];
        assert_eq!((b.start(), b.end()), (0x200, 0x208));
        assert!(b.is_leaf());
        assert_eq!(b.terminator().map(|t| t.opcode), Some(Opcode::Jump));
        assert_eq!(list.code_set().count(), 8);
    }

    #[test]
    fn skip() {
        // SE V0, 5; LD V0, 1; JP self
        let list = discover(&[0x3005, 0x6001, 0x1204]);
        assert_eq!(list.len(), 3);
        let a = at(&list, 0x200);
        let b = at(&list, 0x202);
        let c = at(&list, 0x204);
        assert_eq!(list[a].successor(), Some(b));
        assert_eq!(list[a].conditional_successor(), Some(c));
        assert_eq!(list[b].successor(), Some(c));
        assert!(list[b].terminator().unwrap().is_synthetic());
        assert!(list[c].is_leaf());
        assert_eq!(list[c].predecessors(), &[a, b]);
    }

    #[test]
    fn call_and_return() {
        // CALL 0x206; JP self; data; RET
        let list = discover(&[0x2206, 0x1202, 0x0000, 0x00EE]);
        assert_eq!(list.len(), 3);
        let entries: Vec<u16> = list.jump_table().map(|(_, b)| b.start()).collect();
        assert_eq!(entries, vec![0x202]);
        assert_eq!(list[at(&list, 0x200)].successor(), Some(at(&list, 0x206)));
        assert!(list[at(&list, 0x206)].is_leaf());
        assert!(!list.code_set().contains(0x204));
    }

    #[test]
    fn split_preserves_instructions() {
        // LD V0, 0; ADD V0, 1; SE V0, 5; JP 0x202; JP self
        let words = [0x6000, 0x7001, 0x3005, 0x1202, 0x1208];
        let list = discover(&words);
        let a = at(&list, 0x200);
        let t = at(&list, 0x202);
        let b = at(&list, 0x206);
        let c = at(&list, 0x208);
        assert_eq!(list[a].end(), 0x202);
        assert_eq!(list[a].successor(), Some(t));
        assert_eq!(list[t].successor(), Some(b));
        assert_eq!(list[t].conditional_successor(), Some(c));
        assert_eq!(list[b].successor(), Some(t));
        assert_eq!(list[t].predecessors(), &[a, b]);
        assert_eq!(list[c].predecessors(), &[t]);
        let joined: Vec<u16> = [a, t].iter().flat_map(|&id| list[id].words()).collect();
        assert_eq!(joined, vec![0x6000, 0x7001, 0x3005]);
        assert_eq!(list[a].end() - list[a].start() + list[t].end() - list[t].start(), 6);
    }

    #[test]
    fn split_self() {
        // LD V0, 0; ADD V0, 1; JP 0x202
        let list = discover(&[0x6000, 0x7001, 0x1202]);
        let a = at(&list, 0x200);
        let t = at(&list, 0x202);
        assert_eq!(list[a].successor(), Some(t));
        assert_eq!(list[t].successor(), Some(t));
        assert_eq!(list[t].predecessors(), &[a, t]);
        assert_eq!(list[t].terminator().map(|i| i.raw), Some(0x1202));
    }

    #[test]
    fn split_by_hand() {
        let mut list = discover(&[0x6000, 0x6101, 0x6202, 0x1206]);
        let a = at(&list, 0x200);
        let before: Vec<u16> = list[a].words().collect();
        let tail = list.split(a, 0x204);
        check_invariants(&list);
        let mut after: Vec<u16> = list[a].words().collect();
        after.extend(list[tail].words());
        assert_eq!(before, after);
        assert_eq!(list[tail].start(), 0x204);
        assert_eq!(list[tail].end(), 0x208);
        assert_eq!(list.resolve(0x204), Resolved::Existing(tail));
    }

    #[test]
    fn runs_into_known_block() {
        let memory = program(&[0x6000, 0x6101, 0x6202, 0x1206]);
        let mut list = BlockList::new();
        list.discover(&memory, 0x204);
        list.discover(&memory, 0x200);
        check_invariants(&list);
        let a = at(&list, 0x200);
        assert_eq!(list[a].end(), 0x204);
        assert_eq!(list[a].successor(), Some(at(&list, 0x204)));
    }

    #[test]
    fn overrun() {
        let mut memory = Memory::new();
        memory.set_word(0xFFC, 0x6000);
        let mut list = BlockList::new();
        list.discover(&memory, 0xFFC);
        check_invariants(&list);
        let b = &list[at(&list, 0xFFC)];
        assert_eq!(b.end(), 0x1000);
        assert_eq!(b.terminator().map(|t| t.opcode), Some(Opcode::Overrun));
    }

    #[test]
    fn misaligned_target() {
        // JP 0x203 lands inside LD V1, 0x01.
        let mut list = BlockList::new();
        list.discover(&program(&[0x6000, 0x6101, 0x1203]), ROM_BASE);
        assert!(list.block_at(0x203).is_some());
        assert_eq!(list[at(&list, 0x200)].end(), 0x206);
    }

    #[test]
    fn return_from_outside() {
        // LD V0, 0; LD V1, 1; RET; JP self
        let memory = program(&[0x6000, 0x6101, 0x00EE, 0x1206]);
        let mut list = BlockList::new();
        list.discover(&memory, 0x200);
        assert_eq!(list.len(), 1);
        let plain = list.fingerprint(0x200, 0x200);
        list.discover_return(&memory, 0x206);
        list.discover_return(&memory, 0x202);
        list.discover_return(&memory, 0x206);
        check_invariants(&list);
        assert_eq!(list.len(), 3);
        let entries: Vec<u16> = list.jump_table().map(|(_, b)| b.start()).collect();
        assert_eq!(entries, vec![0x202, 0x206]);
        assert!(list[at(&list, 0x206)].is_leaf());
        assert_eq!(list[at(&list, 0x200)].end(), 0x202);
        let fingerprint = list.fingerprint(0x200, 0x200);
        assert_eq!(&fingerprint.returns[..], &[0x202, 0x206]);
        assert_ne!(fingerprint, plain);
    }

    #[test]
    fn fingerprint() {
        let one = discover(&[0x6005, 0x1202]).fingerprint(0x200, 0x200);
        let two = discover(&[0x6005, 0x1202]).fingerprint(0x200, 0x200);
        assert_eq!(one, two);
        assert_eq!(one.content_hash(), two.content_hash());
        let three = discover(&[0x6006, 0x1202]).fingerprint(0x200, 0x200);
        assert_ne!(one, three);
        // Same words in a different order collide, but are not equal.
        let a = discover(&[0x6001, 0x6102, 0x1204]).fingerprint(0x200, 0x200);
        let b = discover(&[0x6102, 0x6001, 0x1204]).fingerprint(0x200, 0x200);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a, b);
    }

    #[test]
    fn dot() {
        let list = discover(&[0x2206, 0x1202, 0x0000, 0x00EE]);
        let dot = list.to_dot();
        assert!(dot.starts_with("digraph blocks {"));
        assert!(dot.contains("b_200 -> b_206;"));
        assert!(dot.contains("peripheries=2"));
        assert!(dot.contains("CALL 0x206"));
        let dot = discover(&[0x6005, 0x8104, 0x1204]).to_dot();
        assert!(dot.contains("read {} changed {V1} clobbered {V0, VF}\\l"));
    }

    /** Random programs whose control-flow targets are aligned. */
    #[test]
    fn random_programs() {
        let mut rng = Pcg64::seed_from_u64(0xC8);
        for _ in 0..200 {
            let mut memory = Memory::new();
            for addr in (0x200..0x400).step_by(2) {
                let mut word: u16 = rng.gen();
                if matches!(word >> 12, 0x1 | 0x2 | 0xB) {
                    word = (word & 0xF000) | rng.gen_range(0x100..0x200) * 2;
                }
                memory.set_word(addr, word);
            }
            let mut list = BlockList::new();
            list.discover(&memory, 0x200);
            list.discover(&memory, 0x300);
            check_invariants(&list);
            // Every decoded instruction is in exactly one block.
            let mut seen = CodeSet::new();
            for (_, b) in list.iter() {
                for (addr, i) in b.iter() {
                    if i.is_synthetic() { continue; }
                    assert!(!seen.contains(addr));
                    seen.mark(addr, i.size);
                    assert_eq!(memory.word(addr), i.raw);
                }
            }
            assert_eq!(&seen, list.code_set());
        }
    }
}
