//! JVM opcodes understood by the interpreter.
//!
//! The interpreter implements a strict subset of the instruction set. Each
//! entry of the table knows its encoding and its length in the code array so
//! the dispatch loop never hand codes program counter increments.
use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::error::RuntimeErrorKind;

/// Implemented opcodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OPCode {
    Iconst1,
    Bipush,
    Ldc,
    Iload0,
    Pop,
    Isub,
    Imul,
    IfIcmpne,
    Goto,
    Ireturn,
    Return,
    Getstatic,
    Invokestatic,
}

impl OPCode {
    /// Every implemented opcode, in encoding order.
    pub const ALL: [OPCode; 13] = [
        Self::Iconst1,
        Self::Bipush,
        Self::Ldc,
        Self::Iload0,
        Self::Pop,
        Self::Isub,
        Self::Imul,
        Self::IfIcmpne,
        Self::Goto,
        Self::Ireturn,
        Self::Return,
        Self::Getstatic,
        Self::Invokestatic,
    ];

    /// Byte encoding of the opcode.
    pub const fn byte(self) -> u8 {
        match self {
            Self::Iconst1 => 0x04,
            Self::Bipush => 0x10,
            Self::Ldc => 0x12,
            Self::Iload0 => 0x1a,
            Self::Pop => 0x57,
            Self::Isub => 0x64,
            Self::Imul => 0x68,
            Self::IfIcmpne => 0xa0,
            Self::Goto => 0xa7,
            Self::Ireturn => 0xac,
            Self::Return => 0xb1,
            Self::Getstatic => 0xb2,
            Self::Invokestatic => 0xb8,
        }
    }

    /// Length of the instruction in bytes, opcode included.
    pub const fn length(self) -> usize {
        match self {
            Self::Iconst1
            | Self::Iload0
            | Self::Pop
            | Self::Isub
            | Self::Imul
            | Self::Ireturn
            | Self::Return => 1,
            Self::Bipush | Self::Ldc => 2,
            Self::IfIcmpne | Self::Goto | Self::Getstatic | Self::Invokestatic => 3,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Iconst1 => "iconst_1",
            Self::Bipush => "bipush",
            Self::Ldc => "ldc",
            Self::Iload0 => "iload_0",
            Self::Pop => "pop",
            Self::Isub => "isub",
            Self::Imul => "imul",
            Self::IfIcmpne => "if_icmpne",
            Self::Goto => "goto",
            Self::Ireturn => "ireturn",
            Self::Return => "return",
            Self::Getstatic => "getstatic",
            Self::Invokestatic => "invokestatic",
        }
    }
}

impl TryFrom<u8> for OPCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.byte() == byte)
            .ok_or(byte)
    }
}

impl fmt::Display for OPCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Decoded instruction operand.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    // Sign extended immediate.
    Immediate(i32),
    // Constant pool index.
    Index(u16),
    // Branch displacement relative to the opcode.
    Offset(i16),
}

/// Instructions are composed of an opcode and an optional operand.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: OPCode,
    pub operand: Operand,
}

impl Instruction {
    /// Decode the instruction starting at `pc`.
    pub fn decode(code: &[u8], pc: usize) -> Result<Self, RuntimeErrorKind> {
        let byte = *code.get(pc).ok_or(RuntimeErrorKind::TruncatedInstruction)?;
        let mnemonic = OPCode::try_from(byte)
            .map_err(|opcode| RuntimeErrorKind::UnsupportedInstruction { opcode })?;
        let bytes = code
            .get(pc..pc + mnemonic.length())
            .ok_or(RuntimeErrorKind::TruncatedInstruction)?;
        let operand = match mnemonic {
            OPCode::Bipush => Operand::Immediate(bytes[1] as i8 as i32),
            OPCode::Ldc => Operand::Index(bytes[1] as u16),
            OPCode::Getstatic | OPCode::Invokestatic => {
                Operand::Index(BigEndian::read_u16(&bytes[1..]))
            }
            OPCode::Goto | OPCode::IfIcmpne => Operand::Offset(BigEndian::read_i16(&bytes[1..])),
            _ => Operand::None,
        };
        Ok(Self { mnemonic, operand })
    }

    pub fn length(&self) -> usize {
        self.mnemonic.length()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.mnemonic),
            Operand::Immediate(value) => write!(f, "{} {}", self.mnemonic, value),
            Operand::Index(index) => write!(f, "{} #{}", self.mnemonic, index),
            Operand::Offset(offset) => write!(f, "{} {:+}", self.mnemonic, offset),
        }
    }
}
