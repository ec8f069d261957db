/**
 * Represents the address of an [`Op`] that jumps to a `Label`.
 *
 * [`Op`]: super::Op
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Patch(usize);

impl Patch {
    /** The address is expressed as an index into the compiled ops. */
    pub fn new(address: usize) -> Self { Patch(address) }

    pub fn address(&self) -> usize { self.0 }
}

//-----------------------------------------------------------------------------

/**
 * Represents a possibly unknown control-flow target, and accumulates a
 * set of ops that jump to it. Undefined `Label`s are resolved using
 * [`Lowerer::define()`], which patches every op that jumps to it.
 *
 * The code generator creates one `Label` per block, lazily, and shares it
 * between all the block's predecessors.
 *
 * [`Lowerer::define()`]: super::Lowerer::define
 */
#[derive(Debug)]
pub struct Label {
    target: Option<usize>,
    patches: Vec<Patch>,
}

impl Label {
    /** Constructs an unused `Label` with an unknown target address. */
    pub fn new() -> Self {
        Label {target: None, patches: Vec::new()}
    }

    /**
     * Returns the target address of this `Label`, if known. The address is
     * expressed as an index into the compiled ops.
     */
    pub fn target(&self) -> Option<usize> { self.target }

    /** Tests whether `label` has a known target address. */
    pub fn is_defined(&self) -> bool {
        self.target().is_some()
    }

    /** Tests whether any op jumps to `self`. */
    pub fn is_used(&self) -> bool {
        self.is_defined() || !self.patches.is_empty()
    }

    /** Appends `patch` to the list of ops that jump to `self`. */
    pub fn push(&mut self, patch: Patch) {
        self.patches.push(patch);
    }

    /** Returns and forgets all the ops that jump to `self`. */
    pub fn drain(&mut self) -> impl Iterator<Item=Patch> + '_ {
        self.patches.drain(..)
    }
}

impl Default for Label {
    fn default() -> Self { Label::new() }
}

/** Define `label`, which must not previously have been defined. */
pub fn define(label: &mut Label, target: usize) {
    assert!(!label.is_defined());
    label.target = Some(target);
}
