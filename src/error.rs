//! Error taxonomy for espresso.
//!
//! Every boundary of the machine returns its own error type: decoding
//! (`ParseError`), constant pool resolution (`ResolutionError`), descriptor
//! parsing (`DescriptorError`), execution (`RuntimeError`) and the machine
//! facade itself (`VmError`). All of them are fatal to the operation that
//! raised them, nothing is retried or recovered.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::bytecode::{OPCode, Operand};
use crate::constant_pool::ConstantTag;

/// Failures while decoding a class file. A class that fails to decode is
/// never registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("bad magic 0x{0:08x}, expected 0xcafebabe")]
    BadMagic(u32),
    #[error("unexpected end of input at byte {offset} while reading {what}")]
    Truncated { what: &'static str, offset: usize },
    #[error("unknown constant pool tag {tag} at entry #{index}")]
    UnknownConstantTag { tag: u8, index: u16 },
    #[error("{what} refers to constant #{index}, expected {expected}")]
    InvalidReference {
        what: &'static str,
        index: u16,
        expected: ConstantTag,
    },
}

/// Failures while resolving a constant pool entry through a typed accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("constant pool index {index} out of range (pool size {size})")]
    InvalidIndex { index: u16, size: usize },
    #[error("constant pool index {0} does not hold an entry")]
    Unusable(u16),
    #[error("constant #{index}: expected {expected}, found {actual}")]
    TagMismatch {
        index: u16,
        expected: ConstantTag,
        actual: ConstantTag,
    },
    #[error("constant #{index}: malformed {tag} payload")]
    Malformed { index: u16, tag: ConstantTag },
    #[error("constant #{0}: invalid modified UTF-8 payload")]
    InvalidUtf8(u16),
}

/// Failures while parsing a method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("malformed method descriptor `{0}`")]
    Malformed(String),
    #[error("unsupported symbol `{symbol}` at position {position} in descriptor `{descriptor}`")]
    Unsupported {
        descriptor: String,
        symbol: char,
        position: usize,
    },
}

/// Registry lookup miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("class {0} not found")]
pub struct ClassNotFound(pub String);

/// Named attribute lookup miss on a method, field or class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute {name} not found on {owner}")]
pub struct AttributeNotFound {
    pub name: String,
    pub owner: String,
}

/// `RuntimeErrorKind` represents the possible errors that can occur
/// during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    ClassNotFound(#[from] ClassNotFound),
    #[error("method {class}.{name}{descriptor} not found")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("unsupported instruction 0x{opcode:02x}")]
    UnsupportedInstruction { opcode: u8 },
    #[error(transparent)]
    AttributeNotFound(#[from] AttributeNotFound),
    #[error("malformed code attribute: {0}")]
    MalformedCode(#[from] ParseError),
    #[error("operand {operand:?} does not fit opcode 0x{opcode:02x}")]
    MalformedOperand { opcode: u8, operand: Operand },
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("local variable slot {index} out of range ({size} slots)")]
    LocalOutOfRange { index: usize, size: usize },
    #[error("instruction runs past the end of the code array")]
    TruncatedInstruction,
    #[error("branch target {target} is outside the code array")]
    BranchOutOfRange { target: isize },
    #[error("instruction budget of {0} exhausted")]
    InstructionLimitExceeded(u64),
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("execution deadline exceeded")]
    DeadlineExceeded,
}

/// Where in the program an execution error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub class: String,
    pub method: String,
    pub descriptor: String,
    pub pc: usize,
    pub opcode: Option<u8>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}{} at pc {}",
            self.class, self.method, self.descriptor, self.pc
        )?;
        if let Some(opcode) = self.opcode {
            match OPCode::try_from(opcode) {
                Ok(op) => write!(f, " ({op}, 0x{opcode:02x})")?,
                Err(_) => write!(f, " (0x{opcode:02x})")?,
            }
        }
        Ok(())
    }
}

/// `RuntimeError` is a custom type used to handle and represent
/// execution failures, tagged with the frame that raised them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    kind: RuntimeErrorKind,
    location: Option<Location>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Attach a location unless one was already recorded closer to the
    /// failure.
    pub fn at(mut self, location: Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location);
        }
        self
    }

    pub fn kind(&self) -> &RuntimeErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} in {}", self.kind, location),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        Self::new(kind)
    }
}

macro_rules! runtime_error_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for RuntimeError {
                fn from(err: $source) -> Self {
                    Self::new(err.into())
                }
            }
        )*
    };
}

runtime_error_from!(
    ResolutionError,
    ClassNotFound,
    DescriptorError,
    AttributeNotFound,
    ParseError
);

/// Errors surfaced by the `Vm` facade.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse class file: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("class {0} is already loaded")]
    ClassAlreadyLoaded(String),
    #[error(transparent)]
    ClassNotFound(#[from] ClassNotFound),
    #[error("method {class}.{name}{descriptor} not found")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
