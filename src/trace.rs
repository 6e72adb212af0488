//! Runtime tracing module for espresso.
//!
//! The interpreter reports every executed instruction to a `TraceHook`.
//! Hooks are injected by the caller; the default `NoTrace` hook disables
//! event construction entirely.
use std::fmt;
use std::io::{self, Write};

use crate::bytecode::{Instruction, OPCode};

/// Per instruction event, emitted after the instruction has executed.
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    pub class: &'a str,
    pub method: &'a str,
    // Number of live frames, 1 for the entry method.
    pub depth: usize,
    pub pc: usize,
    pub instruction: Instruction,
    // Operand stack of the executing frame after the instruction.
    pub stack: &'a [i32],
}

/// Observer of the interpreter's dispatch loop.
pub trait TraceHook {
    /// When `false` the interpreter skips building events.
    fn enabled(&self) -> bool {
        true
    }

    fn on_instruction(&mut self, event: &TraceEvent<'_>);
}

/// Hook that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl TraceHook for NoTrace {
    fn enabled(&self) -> bool {
        false
    }

    fn on_instruction(&mut self, _event: &TraceEvent<'_>) {}
}

/// Owned copy of a `TraceEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub class: String,
    pub method: String,
    pub depth: usize,
    pub pc: usize,
    pub inst: Instruction,
    pub stack: Vec<i32>,
}

impl From<&TraceEvent<'_>> for RecordEntry {
    fn from(event: &TraceEvent<'_>) -> Self {
        Self {
            class: event.class.to_owned(),
            method: event.method.to_owned(),
            depth: event.depth,
            pc: event.pc,
            inst: event.instruction,
            stack: event.stack.to_vec(),
        }
    }
}

impl fmt::Display for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:indent$}{}.{} @{:<4} {:<20} stack {:?}",
            "",
            self.class,
            self.method,
            self.pc,
            self.inst.to_string(),
            self.stack,
            indent = 2 * self.depth.saturating_sub(1)
        )
    }
}

/// Hook recording every executed instruction in memory.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    trace: Vec<RecordEntry>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.trace
    }

    /// Opcodes in execution order.
    pub fn opcodes(&self) -> Vec<OPCode> {
        self.trace.iter().map(|entry| entry.inst.mnemonic).collect()
    }

    pub fn clear(&mut self) {
        self.trace.clear();
    }
}

impl TraceHook for TraceRecorder {
    fn on_instruction(&mut self, event: &TraceEvent<'_>) {
        self.trace.push(RecordEntry::from(event));
    }
}

impl fmt::Display for TraceRecorder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "---- Trace recorded : {} steps ----", self.trace.len())?;
        for entry in &self.trace {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Hook writing one line per instruction to `W`.
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    out: W,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TraceWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TraceHook for TraceWriter<W> {
    fn on_instruction(&mut self, event: &TraceEvent<'_>) {
        // A broken trace sink must not abort the program being traced.
        let _ = writeln!(self.out, "{}", RecordEntry::from(event));
    }
}
