//! espresso is a minimal Java virtual machine.
//!
//! It decodes class files, keeps them in a name keyed registry and
//! interprets the integer subset of JVM bytecode needed to run static
//! methods calling each other.
pub mod bytecode;
pub mod config;
pub mod constant_pool;
pub mod descriptor;
pub mod error;
pub mod interpreter;
pub mod jvm;
pub mod registry;
pub mod runtime;
pub mod trace;

#[cfg(test)]
mod testing;

pub use config::ExecutionConfig;
pub use error::{RuntimeError, VmError};
pub use runtime::Vm;
pub use trace::{NoTrace, TraceHook, TraceRecorder, TraceWriter};
