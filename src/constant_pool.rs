//! Constant pool representation and typed resolution.
//!
//! Entries are kept as a tag plus the raw payload bytes read from the class
//! file. Typed accessors on `ConstantPool` check the tag of the requested
//! entry and chase indirections through the pool on every call, so the
//! result is always consistent with what is stored.
use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::error::ResolutionError;

type Result<T> = std::result::Result<T, ResolutionError>;

/// Tags of the constant pool entries a class file may carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConstantTag {
    Utf8,
    Integer,
    Float,
    Long,
    Double,
    Class,
    String,
    FieldRef,
    MethodRef,
    InterfaceMethodRef,
    NameAndType,
    MethodHandle,
    MethodType,
    InvokeDynamic,
}

impl ConstantTag {
    /// Returns the tag encoded by `byte`, if any.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let tag = match byte {
            1 => Self::Utf8,
            3 => Self::Integer,
            4 => Self::Float,
            5 => Self::Long,
            6 => Self::Double,
            7 => Self::Class,
            8 => Self::String,
            9 => Self::FieldRef,
            10 => Self::MethodRef,
            11 => Self::InterfaceMethodRef,
            12 => Self::NameAndType,
            15 => Self::MethodHandle,
            16 => Self::MethodType,
            18 => Self::InvokeDynamic,
            _ => return None,
        };
        Some(tag)
    }

    /// Returns the byte used to encode the tag in a class file.
    pub fn byte(self) -> u8 {
        match self {
            Self::Utf8 => 1,
            Self::Integer => 3,
            Self::Float => 4,
            Self::Long => 5,
            Self::Double => 6,
            Self::Class => 7,
            Self::String => 8,
            Self::FieldRef => 9,
            Self::MethodRef => 10,
            Self::InterfaceMethodRef => 11,
            Self::NameAndType => 12,
            Self::MethodHandle => 15,
            Self::MethodType => 16,
            Self::InvokeDynamic => 18,
        }
    }

    /// Size of the payload following the tag byte, `None` for `Utf8` whose
    /// payload is prefixed by its 16-bit length.
    pub fn payload_len(self) -> Option<usize> {
        match self {
            Self::Utf8 => None,
            Self::Class | Self::String | Self::MethodType => Some(2),
            Self::MethodHandle => Some(3),
            Self::Integer
            | Self::Float
            | Self::FieldRef
            | Self::MethodRef
            | Self::InterfaceMethodRef
            | Self::NameAndType
            | Self::InvokeDynamic => Some(4),
            Self::Long | Self::Double => Some(8),
        }
    }

    /// Long and Double entries take up two slots in the pool, the second
    /// one is unusable.
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }
}

impl fmt::Display for ConstantTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Utf8 => "Utf8",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Class => "Class",
            Self::String => "String",
            Self::FieldRef => "Fieldref",
            Self::MethodRef => "Methodref",
            Self::InterfaceMethodRef => "InterfaceMethodref",
            Self::NameAndType => "NameAndType",
            Self::MethodHandle => "MethodHandle",
            Self::MethodType => "MethodType",
            Self::InvokeDynamic => "InvokeDynamic",
        };
        f.write_str(name)
    }
}

/// A single constant pool entry, its tag and undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantEntry {
    tag: ConstantTag,
    bytes: Vec<u8>,
    // Decoded text of `Utf8` entries, `None` if the payload is malformed.
    text: Option<String>,
}

impl ConstantEntry {
    pub fn new(tag: ConstantTag, bytes: Vec<u8>) -> Self {
        let text = match tag {
            ConstantTag::Utf8 => decode_modified_utf8(&bytes),
            _ => None,
        };
        Self { tag, bytes, text }
    }

    pub fn tag(&self) -> ConstantTag {
        self.tag
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Decode the modified UTF-8 used by class files: NUL is encoded on two
/// bytes and supplementary characters as a pair of 3-byte surrogates.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    fn continuation(byte: u8) -> Option<u16> {
        (byte & 0xc0 == 0x80).then_some(u16::from(byte & 0x3f))
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(lead) = iter.next() {
        let unit = match lead {
            0x01..=0x7f => u16::from(lead),
            0xc0..=0xdf => {
                let low = continuation(iter.next()?)?;
                (u16::from(lead & 0x1f) << 6) | low
            }
            0xe0..=0xef => {
                let mid = continuation(iter.next()?)?;
                let low = continuation(iter.next()?)?;
                (u16::from(lead & 0x0f) << 12) | (mid << 6) | low
            }
            // Raw NUL and 4-byte sequences never appear in modified UTF-8.
            _ => return None,
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

/// A symbolic reference to a class member, resolved from a `Fieldref`,
/// `Methodref` or `InterfaceMethodref` entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// 1-indexed table of constant entries. Slot 0 and the slot following a
/// Long or Double never hold an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Option<ConstantEntry>>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
        }
    }

    /// Append an entry, reserving the phantom slot for wide constants.
    pub fn push(&mut self, entry: ConstantEntry) {
        let wide = entry.tag.is_wide();
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
    }

    /// Number of slots including slot 0, which is the value stored in the
    /// `constant_pool_count` field of a class file.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over the usable entries along with their index.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|e| (index as u16, e)))
    }

    /// Returns the entry at `index` whatever its tag.
    pub fn get(&self, index: u16) -> Result<&ConstantEntry> {
        match self.entries.get(index as usize) {
            Some(Some(entry)) => Ok(entry),
            Some(None) => Err(ResolutionError::Unusable(index)),
            None => Err(ResolutionError::InvalidIndex {
                index,
                size: self.entries.len(),
            }),
        }
    }

    /// Returns the entry at `index`, failing if its tag is not `expected`.
    fn typed(&self, index: u16, expected: ConstantTag) -> Result<&ConstantEntry> {
        let entry = self.get(index)?;
        if entry.tag != expected {
            return Err(ResolutionError::TagMismatch {
                index,
                expected,
                actual: entry.tag,
            });
        }
        Ok(entry)
    }

    fn payload(&self, index: u16, expected: ConstantTag) -> Result<&[u8]> {
        self.typed(index, expected).map(ConstantEntry::bytes)
    }

    /// Read the big endian `u16` at `offset` in the payload of `index`.
    fn index_at(&self, index: u16, tag: ConstantTag, offset: usize) -> Result<u16> {
        let payload = self.payload(index, tag)?;
        payload
            .get(offset..offset + 2)
            .map(BigEndian::read_u16)
            .ok_or(ResolutionError::Malformed { index, tag })
    }

    /// Tag of the entry at `index`.
    pub fn tag(&self, index: u16) -> Result<ConstantTag> {
        self.get(index).map(ConstantEntry::tag)
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        self.typed(index, ConstantTag::Utf8)?
            .text
            .as_deref()
            .ok_or(ResolutionError::InvalidUtf8(index))
    }

    pub fn integer(&self, index: u16) -> Result<i32> {
        let payload = self.payload(index, ConstantTag::Integer)?;
        if payload.len() != 4 {
            return Err(ResolutionError::Malformed {
                index,
                tag: ConstantTag::Integer,
            });
        }
        Ok(BigEndian::read_i32(payload))
    }

    /// Internal name of the class referenced by a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        let name_index = self.index_at(index, ConstantTag::Class, 0)?;
        self.utf8(name_index)
    }

    /// Contents of a `String` entry.
    pub fn string(&self, index: u16) -> Result<&str> {
        let utf8_index = self.index_at(index, ConstantTag::String, 0)?;
        self.utf8(utf8_index)
    }

    /// Name and descriptor of a `NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        let name_index = self.index_at(index, ConstantTag::NameAndType, 0)?;
        let descriptor_index = self.index_at(index, ConstantTag::NameAndType, 2)?;
        Ok((self.utf8(name_index)?, self.utf8(descriptor_index)?))
    }

    fn member_ref(&self, index: u16, tag: ConstantTag) -> Result<MemberRef<'_>> {
        let class_index = self.index_at(index, tag, 0)?;
        let name_and_type_index = self.index_at(index, tag, 2)?;
        let class = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef {
            class,
            name,
            descriptor,
        })
    }

    pub fn field_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        self.member_ref(index, ConstantTag::FieldRef)
    }

    pub fn method_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        self.member_ref(index, ConstantTag::MethodRef)
    }

    pub fn interface_method_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        self.member_ref(index, ConstantTag::InterfaceMethodRef)
    }
}
