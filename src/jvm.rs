//! Lightweight implementation of a parser and decoder for JVM bytecode
//! class files.
//!
//! Decoding is a single pass over the input with every span either of fixed
//! size or length prefixed. Attributes are kept as raw payloads and only
//! specialised (e.g. `Code`) when asked for, so attribute kinds the machine
//! does not understand never block loading.
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use tracing::warn;

use crate::constant_pool::{ConstantEntry, ConstantPool, ConstantTag};
use crate::error::{AttributeNotFound, ParseError, ResolutionError, RuntimeErrorKind};

type Result<T> = std::result::Result<T, ParseError>;

/// Signature every class file starts with.
pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;

/// Reads the class file at `path` into memory.
pub fn read_class_file(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
}

/// Big endian reader over the class file bytes that reports what it was
/// reading and where when the input runs out.
struct ClassReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ClassReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.offset())
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        let offset = self.offset();
        self.cursor
            .read_u8()
            .map_err(|_| ParseError::Truncated { what, offset })
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        let offset = self.offset();
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| ParseError::Truncated { what, offset })
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        let offset = self.offset();
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| ParseError::Truncated { what, offset })
    }

    fn bytes(&mut self, len: usize, what: &'static str) -> Result<Vec<u8>> {
        let offset = self.offset();
        // Check before allocating, lengths come straight from the input.
        if len > self.remaining() {
            return Err(ParseError::Truncated { what, offset });
        }
        let mut buf = vec![0; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| ParseError::Truncated { what, offset })?;
        Ok(buf)
    }
}

/// Generic attribute, a name and an undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    name_index: u16,
    info: Vec<u8>,
}

impl AttributeInfo {
    pub fn name_index(&self) -> u16 {
        self.name_index
    }

    pub fn name<'a>(
        &self,
        pool: &'a ConstantPool,
    ) -> std::result::Result<&'a str, ResolutionError> {
        pool.utf8(self.name_index)
    }

    pub fn info(&self) -> &[u8] {
        &self.info
    }

    fn read(reader: &mut ClassReader) -> Result<Self> {
        let name_index = reader.u16("attribute name index")?;
        let length = reader.u32("attribute length")?;
        let info = reader.bytes(length as usize, "attribute payload")?;
        Ok(Self { name_index, info })
    }

    fn read_all(reader: &mut ClassReader) -> Result<Vec<Self>> {
        let count = reader.u16("attribute count")?;
        (0..count).map(|_| Self::read(reader)).collect()
    }
}

/// Row of a `Code` attribute exception table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    /// Decode the payload of a `Code` attribute.
    pub fn decode(info: &[u8]) -> Result<Self> {
        let mut reader = ClassReader::new(info);
        let max_stack = reader.u16("max stack")?;
        let max_locals = reader.u16("max locals")?;
        let code_length = reader.u32("code length")?;
        let code = reader.bytes(code_length as usize, "code")?;
        let exception_count = reader.u16("exception table length")?;
        let exception_table = (0..exception_count)
            .map(|_| -> Result<ExceptionTableEntry> {
                Ok(ExceptionTableEntry {
                    start_pc: reader.u16("exception start pc")?,
                    end_pc: reader.u16("exception end pc")?,
                    handler_pc: reader.u16("exception handler pc")?,
                    catch_type: reader.u16("exception catch type")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let attributes = AttributeInfo::read_all(&mut reader)?;
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }
}

fn find_attribute<'a>(
    attributes: &'a [AttributeInfo],
    pool: &ConstantPool,
    name: &str,
    owner: impl FnOnce() -> String,
) -> std::result::Result<&'a AttributeInfo, AttributeNotFound> {
    attributes
        .iter()
        .find(|attr| matches!(attr.name(pool), Ok(n) if n == name))
        .ok_or_else(|| AttributeNotFound {
            name: name.to_owned(),
            owner: owner(),
        })
}

/// Shared layout of field and method records.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberInfo {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: Vec<AttributeInfo>,
}

impl MemberInfo {
    fn read(reader: &mut ClassReader, pool: &ConstantPool, what: &'static str) -> Result<Self> {
        let access_flags = reader.u16("member access flags")?;
        let name_index = reader.u16("member name index")?;
        let descriptor_index = reader.u16("member descriptor index")?;
        require_utf8(pool, name_index, what)?;
        require_utf8(pool, descriptor_index, what)?;
        let attributes = AttributeInfo::read_all(reader)?;
        validate_attributes(pool, &attributes)?;
        Ok(Self {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn label(&self, pool: &ConstantPool) -> String {
        format!(
            "{}{}",
            pool.utf8(self.name_index).unwrap_or("?"),
            pool.utf8(self.descriptor_index).unwrap_or("")
        )
    }
}

/// Field record of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo(MemberInfo);

impl FieldInfo {
    pub fn access_flags(&self) -> u16 {
        self.0.access_flags
    }

    pub fn name_index(&self) -> u16 {
        self.0.name_index
    }

    pub fn descriptor_index(&self) -> u16 {
        self.0.descriptor_index
    }

    pub fn name<'a>(
        &self,
        pool: &'a ConstantPool,
    ) -> std::result::Result<&'a str, ResolutionError> {
        pool.utf8(self.0.name_index)
    }

    pub fn descriptor<'a>(
        &self,
        pool: &'a ConstantPool,
    ) -> std::result::Result<&'a str, ResolutionError> {
        pool.utf8(self.0.descriptor_index)
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.0.attributes
    }

    pub fn attribute(
        &self,
        pool: &ConstantPool,
        name: &str,
    ) -> std::result::Result<&AttributeInfo, AttributeNotFound> {
        find_attribute(&self.0.attributes, pool, name, || {
            format!("field {}", self.0.label(pool))
        })
    }
}

/// Method record of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo(MemberInfo);

impl MethodInfo {
    pub fn access_flags(&self) -> u16 {
        self.0.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.0.access_flags & ACC_STATIC != 0
    }

    pub fn name_index(&self) -> u16 {
        self.0.name_index
    }

    pub fn descriptor_index(&self) -> u16 {
        self.0.descriptor_index
    }

    pub fn name<'a>(
        &self,
        pool: &'a ConstantPool,
    ) -> std::result::Result<&'a str, ResolutionError> {
        pool.utf8(self.0.name_index)
    }

    pub fn descriptor<'a>(
        &self,
        pool: &'a ConstantPool,
    ) -> std::result::Result<&'a str, ResolutionError> {
        pool.utf8(self.0.descriptor_index)
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.0.attributes
    }

    /// Returns the attribute called `name`, failing loudly when absent.
    pub fn attribute(
        &self,
        pool: &ConstantPool,
        name: &str,
    ) -> std::result::Result<&AttributeInfo, AttributeNotFound> {
        find_attribute(&self.0.attributes, pool, name, || {
            format!("method {}", self.0.label(pool))
        })
    }

    /// Decode the method's `Code` attribute.
    pub fn code(
        &self,
        pool: &ConstantPool,
    ) -> std::result::Result<CodeAttribute, RuntimeErrorKind> {
        let attr = self.attribute(pool, "Code")?;
        Ok(CodeAttribute::decode(attr.info())?)
    }
}

/// Decoded class file. Immutable once built by `JVMParser::parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JVMClassFile {
    magic: u32,
    minor_version: u16,
    major_version: u16,
    constant_pool: ConstantPool,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attributes: Vec<AttributeInfo>,
}

impl JVMClassFile {
    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn this_class(&self) -> u16 {
        self.this_class
    }

    pub fn super_class(&self) -> u16 {
        self.super_class
    }

    pub fn interfaces(&self) -> &[u16] {
        &self.interfaces
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    /// Internal name of this class, e.g. `java/lang/Object`.
    pub fn name(&self) -> std::result::Result<&str, ResolutionError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the super class, `None` for `java/lang/Object`.
    pub fn super_class_name(&self) -> std::result::Result<Option<&str>, ResolutionError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Linear scan for a method by name and descriptor. Absence is an
    /// expected outcome, not an error.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        let pool = &self.constant_pool;
        self.methods.iter().find(|method| {
            matches!(method.name(pool), Ok(n) if n == name)
                && matches!(method.descriptor(pool), Ok(d) if d == descriptor)
        })
    }

    pub fn attribute(&self, name: &str) -> std::result::Result<&AttributeInfo, AttributeNotFound> {
        find_attribute(&self.attributes, &self.constant_pool, name, || {
            format!("class {}", self.name().unwrap_or("?"))
        })
    }
}

fn require_utf8(pool: &ConstantPool, index: u16, what: &'static str) -> Result<()> {
    pool.utf8(index)
        .map(|_| ())
        .map_err(|_| ParseError::InvalidReference {
            what,
            index,
            expected: ConstantTag::Utf8,
        })
}

fn validate_attributes(pool: &ConstantPool, attributes: &[AttributeInfo]) -> Result<()> {
    attributes
        .iter()
        .try_for_each(|attr| require_utf8(pool, attr.name_index, "attribute name"))
}

/// `JVMParser` decodes class file bytes into a `JVMClassFile`.
pub struct JVMParser;

impl JVMParser {
    /// Decode `bytes` into a class file. Either the whole input decodes or
    /// an error is returned, there is no partial result.
    pub fn parse(bytes: &[u8]) -> Result<JVMClassFile> {
        let mut reader = ClassReader::new(bytes);

        let magic = reader.u32("magic")?;
        if magic != MAGIC {
            return Err(ParseError::BadMagic(magic));
        }
        let minor_version = reader.u16("minor version")?;
        let major_version = reader.u16("major version")?;

        let constant_pool = Self::parse_constant_pool(&mut reader)?;

        let access_flags = reader.u16("access flags")?;
        let this_class = reader.u16("this class")?;
        if constant_pool.class_name(this_class).is_err() {
            return Err(ParseError::InvalidReference {
                what: "this class",
                index: this_class,
                expected: ConstantTag::Class,
            });
        }
        let super_class = reader.u16("super class")?;
        if super_class != 0 && constant_pool.class_name(super_class).is_err() {
            return Err(ParseError::InvalidReference {
                what: "super class",
                index: super_class,
                expected: ConstantTag::Class,
            });
        }

        let interface_count = reader.u16("interface count")?;
        let interfaces = (0..interface_count)
            .map(|_| reader.u16("interface index"))
            .collect::<Result<Vec<_>>>()?;

        let field_count = reader.u16("field count")?;
        let fields = (0..field_count)
            .map(|_| MemberInfo::read(&mut reader, &constant_pool, "field").map(FieldInfo))
            .collect::<Result<Vec<_>>>()?;

        let method_count = reader.u16("method count")?;
        let methods = (0..method_count)
            .map(|_| MemberInfo::read(&mut reader, &constant_pool, "method").map(MethodInfo))
            .collect::<Result<Vec<_>>>()?;

        let attributes = AttributeInfo::read_all(&mut reader)?;
        validate_attributes(&constant_pool, &attributes)?;

        if reader.remaining() > 0 {
            warn!(
                "{} trailing bytes after class file attributes",
                reader.remaining()
            );
        }

        Ok(JVMClassFile {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn parse_constant_pool(reader: &mut ClassReader) -> Result<ConstantPool> {
        // The count is one more than the number of slots.
        let count = reader.u16("constant pool count")?;
        let mut pool = ConstantPool::new();
        while pool.count() < count as usize {
            let index = pool.count() as u16;
            let byte = reader.u8("constant tag")?;
            let tag = ConstantTag::from_byte(byte)
                .ok_or(ParseError::UnknownConstantTag { tag: byte, index })?;
            let len = match tag.payload_len() {
                Some(len) => len,
                None => reader.u16("utf8 length")? as usize,
            };
            let bytes = reader.bytes(len, "constant payload")?;
            pool.push(ConstantEntry::new(tag, bytes));
        }
        Ok(pool)
    }
}
