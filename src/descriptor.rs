//! Method descriptor parsing.
//!
//! Only the `int` primitive is understood, as an argument or a return type,
//! plus `void` as a return type. Any other symbol is rejected rather than
//! skipped so invocation arity is never guessed.
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::DescriptorError;

/// Types a descriptor may mention.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int,
    Void,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int => f.write_str("I"),
            Self::Void => f.write_str("V"),
        }
    }
}

/// Parsed method descriptor, `(ArgType*)ReturnType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub args: Vec<TypeTag>,
    pub ret: TypeTag,
}

fn shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| Regex::new(r"^\(([^)]*)\)(.+)$").expect("descriptor regex is valid"))
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let caps = shape()
            .captures(descriptor)
            .ok_or_else(|| DescriptorError::Malformed(descriptor.to_owned()))?;
        let (args, ret) = match (caps.get(1), caps.get(2)) {
            (Some(args), Some(ret)) => (args, ret),
            _ => return Err(DescriptorError::Malformed(descriptor.to_owned())),
        };

        let unsupported = |symbol: char, position: usize| DescriptorError::Unsupported {
            descriptor: descriptor.to_owned(),
            symbol,
            position,
        };

        let args = args
            .as_str()
            .char_indices()
            .map(|(i, symbol)| match symbol {
                'I' => Ok(TypeTag::Int),
                _ => Err(unsupported(symbol, args.start() + i)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut symbols = ret.as_str().chars();
        let ret_tag = match symbols.next() {
            Some('I') => TypeTag::Int,
            Some('V') => TypeTag::Void,
            Some(symbol) => return Err(unsupported(symbol, ret.start())),
            None => return Err(DescriptorError::Malformed(descriptor.to_owned())),
        };
        if symbols.next().is_some() {
            return Err(DescriptorError::Malformed(descriptor.to_owned()));
        }

        Ok(Self { args, ret: ret_tag })
    }

    /// Number of argument slots popped by an invocation.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn returns_value(&self) -> bool {
        self.ret != TypeTag::Void
    }
}

impl FromStr for MethodDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(")?;
        for arg in &self.args {
            write!(f, "{arg}")?;
        }
        write!(f, "){}", self.ret)
    }
}
