/*!
 * Dynamic translation of CHIP-8 code.
 *
 * A [`BlockList`] discovers the control-flow graph of a translation unit by
 * walking its byte code. [`codegen`] compiles the graph into a
 * [`Routine`](crate::target::Routine). A [`Translator`] caches the routines
 * by content and runs them, recompiling when a program overwrites its own
 * code.
 */

mod code_set;
pub use code_set::{CodeSet};

mod block;
pub use block::{BlockId, Block};

pub mod block_list;
pub use block_list::{BlockList, Resolved, Fingerprint};

pub mod codegen;
pub use codegen::{HALT, generate};

mod translator;
pub use translator::{CompiledUnit, Cache, Options, Statistics, Translator};
