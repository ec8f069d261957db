use std::fs;
use std::path::{PathBuf};
use std::rc::{Rc};

use indexmap::{IndexMap};
use tracing::{debug, debug_span, info, warn, error};

use crate::chip8::{Memory, Registers, ReturnStack};
use crate::error::{Fault};
use crate::target::{Environment, Routine};
use super::{BlockList, CodeSet, Fingerprint, codegen};

/**
 * A [`Routine`] compiled from one translation unit, with the fingerprint
 * of the code it was compiled from.
 */
pub struct CompiledUnit {
    fingerprint: Fingerprint,
    routine: Routine,
}

impl CompiledUnit {
    pub fn fingerprint(&self) -> &Fingerprint { &self.fingerprint }

    pub fn hash(&self) -> u64 { self.fingerprint.content_hash() }

    pub fn base(&self) -> u16 { self.fingerprint.base }

    pub fn entry(&self) -> u16 { self.fingerprint.entry }

    pub fn code_set(&self) -> &CodeSet { self.routine.code_set() }

    pub fn routine(&self) -> &Routine { &self.routine }

    /**
     * Runs the routine. Returns the address at which to continue, or
     * [`HALT`](codegen::HALT).
     */
    pub fn invoke(
        &self,
        registers: &mut Registers,
        stack: &mut ReturnStack,
        env: &mut Environment,
    ) -> Result<u16, Fault> {
        self.routine.execute(registers, stack, env)
    }
}

impl std::fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("base", &format_args!("{:#05x}", self.base()))
            .field("entry", &format_args!("{:#05x}", self.entry()))
            .field("hash", &format_args!("{:#018x}", self.hash()))
            .field("ops", &self.routine.ops().len())
            .finish()
    }
}

//-----------------------------------------------------------------------------

/** Compiled units, keyed by the code they were compiled from. Never evicted. */
#[derive(Debug, Default)]
pub struct Cache(IndexMap<Fingerprint, Rc<CompiledUnit>>);

impl Cache {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Rc<CompiledUnit>> {
        self.0.get(fingerprint)
    }

    fn insert(&mut self, unit: Rc<CompiledUnit>) {
        let old = self.0.insert(unit.fingerprint.clone(), unit);
        assert!(old.is_none());
    }

    /** Yields the units in the order they were compiled. */
    pub fn iter(&self) -> impl Iterator<Item=&Rc<CompiledUnit>> {
        self.0.values()
    }
}

//-----------------------------------------------------------------------------

/** Knobs that do not change what a program computes. */
#[derive(Debug, Clone, Default)]
pub struct Options {
    /** Compile routines that report every register write to the host. */
    pub debug_bytes: bool,
    /** If set, every newly compiled unit's graph is written here. */
    pub dump_dir: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /** Units compiled from scratch. */
    pub compiles: usize,
    /** Compilations satisfied by the cache. */
    pub hits: usize,
    /** Routine invocations. */
    pub invocations: usize,
}

/**
 * Discovers, compiles and runs CHIP-8 code.
 *
 * Every compilation discovers the whole unit afresh from the base address,
 * the requested entry address and the return addresses on the call stack,
 * and looks it up in the [`Cache`] by content. A routine that overwrites its own code exits, and `run()`
 * compiles again from the address where it stopped.
 */
pub struct Translator {
    cache: Cache,
    base: u16,
    options: Options,
    statistics: Statistics,
}

impl Translator {
    pub fn new(cache: Cache, base: u16) -> Self {
        Translator {cache, base, options: Options::default(), statistics: Statistics::default()}
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn base(&self) -> u16 { self.base }

    pub fn cache(&self) -> &Cache { &self.cache }

    pub fn statistics(&self) -> Statistics { self.statistics }

    /**
     * Returns a routine for the unit at `base` entered at `exec`. `returns`
     * are the return addresses on the call stack. They become jump-table
     * entries even if no call in the unit pushes them.
     */
    pub fn compile(&mut self, memory: &Memory, base: u16, exec: u16, returns: &[u16]) -> Rc<CompiledUnit> {
        let list = {
            let _span = debug_span!("discover", base, exec, depth = returns.len()).entered();
            let mut list = BlockList::new();
            list.discover(memory, base);
            list.discover(memory, exec);
            for &addr in returns {
                list.discover_return(memory, addr);
            }
            list
        };
        let fingerprint = list.fingerprint(base, exec);
        if let Some(unit) = self.cache.get(&fingerprint) {
            self.statistics.hits += 1;
            debug!(base, exec, hash = unit.hash(), "cache hit");
            return unit.clone();
        }
        let routine = {
            let _span = debug_span!("codegen", base, exec).entered();
            codegen::generate(&list, exec, self.options.debug_bytes)
        };
        let unit = Rc::new(CompiledUnit {fingerprint, routine});
        self.statistics.compiles += 1;
        debug!(base, exec, hash = unit.hash(), blocks = list.len(), "compiled");
        if let Some(dir) = &self.options.dump_dir {
            let path = dir.join(format!("unit_{:03x}_{:03x}_{:016x}.dot", base, exec, unit.hash()));
            if let Err(e) = fs::write(&path, list.to_dot()) {
                warn!("cannot write {}: {}", path.display(), e);
            }
        }
        self.cache.insert(unit.clone());
        unit
    }

    /**
     * Runs the program from `start` until it halts or faults, recompiling
     * whenever a routine exits.
     */
    pub fn run(
        &mut self,
        start: u16,
        registers: &mut Registers,
        stack: &mut ReturnStack,
        env: &mut Environment,
    ) -> Result<(), Fault> {
        info!(base = self.base, start, "run");
        let mut pc = start;
        loop {
            let returns = &stack[..registers.sp as usize];
            let unit = self.compile(env.memory, self.base, pc, returns);
            self.statistics.invocations += 1;
            match unit.invoke(registers, stack, env) {
                Ok(codegen::HALT) => {
                    info!(statistics = ?self.statistics, "halted");
                    return Ok(());
                },
                Ok(next) => {
                    debug!(from = pc, to = next, "exit");
                    pc = next;
                },
                Err(fault) => {
                    error!(%fault, ?registers, statistics = ?self.statistics, "fault");
                    return Err(fault);
                },
            }
        }
    }
}
