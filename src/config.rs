//! Execution budgets for the interpreter.
use std::time::Duration;

/// Default bound on the number of live frames.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Call-site configurable limits checked at the top of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Maximum number of instructions a single invocation may execute,
    /// nested calls included. `None` means unbounded.
    pub instruction_limit: Option<u64>,
    /// Maximum number of frames on the frame stack.
    pub max_call_depth: usize,
    /// Wall-clock budget of a single invocation.
    pub deadline: Option<Duration>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            instruction_limit: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            deadline: None,
        }
    }
}

impl ExecutionConfig {
    pub fn with_instruction_limit(mut self, limit: u64) -> Self {
        self.instruction_limit = Some(limit);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
