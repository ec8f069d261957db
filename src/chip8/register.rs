use std::fmt::{Debug, Formatter};

/** Names one of the 18 CHIP-8 register slots. */
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(u8);

impl RegisterId {
    /** The flag register. */
    pub const VF: Self = RegisterId(0xF);
    /** The index register. */
    pub const I: Self = RegisterId(16);
    /** The return-stack pointer. */
    pub const SP: Self = RegisterId(17);

    /** The number of register slots. */
    pub const COUNT: usize = 18;

    /** The general-purpose register `V[index]`. */
    pub fn v(index: u8) -> Self {
        assert!(index < 16);
        RegisterId(index)
    }

    pub fn as_usize(self) -> usize { self.0 as usize }

    /** All 18 register slots, in context order. */
    pub fn all() -> impl Iterator<Item=Self> {
        (0..Self::COUNT as u8).map(RegisterId)
    }
}

impl Debug for RegisterId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.0 {
            16 => write!(f, "I"),
            17 => write!(f, "SP"),
            v => write!(f, "V{:X}", v),
        }
    }
}

//-----------------------------------------------------------------------------

/** A set of [`RegisterId`]s. */
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct RegisterSet(u32);

impl RegisterSet {
    pub fn empty() -> Self { RegisterSet(0) }

    pub fn single(r: RegisterId) -> Self { RegisterSet(1 << r.0) }

    /** `V0` to `V[last]` inclusive. */
    pub fn v_range(last: u8) -> Self {
        assert!(last < 16);
        RegisterSet((2 << last) - 1)
    }

    pub fn with(self, r: RegisterId) -> Self { RegisterSet(self.0 | 1 << r.0) }

    pub fn without(self, r: RegisterId) -> Self { RegisterSet(self.0 & !(1 << r.0)) }

    pub fn contains(self, r: RegisterId) -> bool { self.0 & (1 << r.0) != 0 }

    pub fn union(self, other: Self) -> Self { RegisterSet(self.0 | other.0) }

    pub fn minus(self, other: Self) -> Self { RegisterSet(self.0 & !other.0) }

    pub fn intersect(self, other: Self) -> Self { RegisterSet(self.0 & other.0) }

    pub fn is_empty(self) -> bool { self.0 == 0 }

    pub fn iter(self) -> impl Iterator<Item=RegisterId> {
        RegisterId::all().filter(move |&r| self.contains(r))
    }
}

impl Debug for RegisterSet {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

//-----------------------------------------------------------------------------

/**
 * How a piece of code uses the registers.
 *  - `read`: registers whose incoming value is used, without modifying them
 *    in place. A register that is read and then overwritten appears here and
 *    in `clobbered`.
 *  - `changed`: registers whose value is modified in place.
 *  - `clobbered`: registers that are overwritten.
 */
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub read: RegisterSet,
    pub changed: RegisterSet,
    pub clobbered: RegisterSet,
}

impl UsageInfo {
    pub fn new(read: RegisterSet, changed: RegisterSet, clobbered: RegisterSet) -> Self {
        UsageInfo {read, changed, clobbered}
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.changed.is_empty() && self.clobbered.is_empty()
    }

    /** The registers whose values may differ afterwards. */
    pub fn exit_saves(&self) -> RegisterSet { self.changed.union(self.clobbered) }

    /** The usage of `self` followed by `next`. */
    pub fn then(&self, next: &Self) -> Self {
        let written = self.exit_saves();
        let changed = self.changed.union(next.changed.minus(written));
        let read = self.read.union(next.read.minus(written)).minus(changed);
        let clobbered = self.clobbered
            .union(next.clobbered)
            .union(next.changed.intersect(written))
            .minus(changed);
        UsageInfo {read, changed, clobbered}
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn sets() {
        let s = RegisterSet::v_range(2).with(RegisterId::I);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![
            RegisterId::v(0), RegisterId::v(1), RegisterId::v(2), RegisterId::I,
        ]);
        assert!(!s.without(RegisterId::v(1)).contains(RegisterId::v(1)));
        assert_eq!(RegisterSet::v_range(15).iter().count(), 16);
        assert_eq!(format!("{:?}", RegisterId::SP), "SP");
    }

    #[test]
    fn sequence() {
        let v0 = RegisterId::v(0);
        let v1 = RegisterId::v(1);
        let one = RegisterSet::single;
        let none = RegisterSet::empty();
        // LD V0, 5; ADD V0, 1: V0 is not an incoming value.
        let load = UsageInfo::new(none, none, one(v0));
        let add = UsageInfo::new(none, one(v0), none);
        let both = load.then(&add);
        assert!(both.read.union(both.changed).is_empty());
        assert_eq!(both.exit_saves(), one(v0));
        // ADD V0, 1; LD V0, V1: V0 is incoming and modified.
        let mov = UsageInfo::new(one(v1), none, one(v0));
        let both = add.then(&mov);
        assert_eq!(both.read.union(both.changed), one(v0).with(v1));
        assert_eq!(both.exit_saves(), one(v0));
    }
}
