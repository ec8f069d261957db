/*!
 * A dynamic binary translator for CHIP-8.
 *
 * The translator discovers the control flow of a program by walking its byte
 * code, compiles each discovered region into a [`Routine`](target::Routine),
 * caches the routines by content, and recompiles when a program overwrites
 * its own code.
 */

pub mod error;
pub use error::{Error, Fault, Result};

pub mod chip8;

pub mod code;

pub mod target;

pub mod translate;

pub mod host;

pub mod system;
pub use system::{Settings, System};
