/*!
 * The back end of the code generator. [`Lowerer`] assembles [`Action`]s and
 * control flow into a flat sequence of [`Op`]s, and [`Routine`] runs them.
 *
 * A [`Routine`] takes the register context by reference, loads it into
 * local storage, and stores it back before it returns.
 *
 * [`Action`]: crate::code::Action
 */

mod label;
pub use label::{Patch, Label};

mod routine;
pub use routine::{Target, UNPATCHED, Op, Environment, Routine};

mod lowerer;
pub use lowerer::{Lowerer};
