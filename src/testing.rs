//! In-memory class file assembler used by the unit tests.
use byteorder::{BigEndian, WriteBytesExt};

use crate::constant_pool::ConstantTag;
use crate::jvm::{ACC_PUBLIC, ACC_STATIC, MAGIC};

struct Member {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: Vec<(u16, Vec<u8>)>,
}

/// Builds a well formed class file. Constants are deduplicated and indices
/// are handed out the same way `javac` lays them out, Long and Double
/// entries taking two slots.
pub struct ClassBuilder {
    constants: Vec<(ConstantTag, Vec<u8>, u16)>,
    next_index: u16,
    this_class: u16,
    super_class: u16,
    fields: Vec<Member>,
    methods: Vec<Member>,
    attributes: Vec<(u16, Vec<u8>)>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            constants: Vec::new(),
            next_index: 1,
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        builder.this_class = builder.class(name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    fn constant(&mut self, tag: ConstantTag, bytes: Vec<u8>) -> u16 {
        if let Some((_, _, index)) = self
            .constants
            .iter()
            .find(|(t, b, _)| *t == tag && *b == bytes)
        {
            return *index;
        }
        let index = self.next_index;
        self.next_index += if tag.is_wide() { 2 } else { 1 };
        self.constants.push((tag, bytes, index));
        index
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        self.constant(ConstantTag::Utf8, modified_utf8(value))
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let utf8_index = self.utf8(value);
        self.constant(ConstantTag::String, utf8_index.to_be_bytes().to_vec())
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.constant(ConstantTag::Integer, value.to_be_bytes().to_vec())
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.constant(ConstantTag::Long, value.to_be_bytes().to_vec())
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.constant(ConstantTag::Class, name_index.to_be_bytes().to_vec())
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.constant(ConstantTag::NameAndType, pair(name_index, descriptor_index))
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.constant(
            ConstantTag::MethodRef,
            pair(class_index, name_and_type_index),
        )
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.constant(
            ConstantTag::FieldRef,
            pair(class_index, name_and_type_index),
        )
    }

    pub fn field(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(Member {
            access_flags: ACC_STATIC,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self
    }

    /// Add a public static method with a `Code` attribute.
    pub fn method(
        &mut self,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
    ) -> &mut Self {
        self.method_with_exception_table(name, descriptor, max_stack, max_locals, code, &[])
    }

    pub fn method_with_exception_table(
        &mut self,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
        exception_table: &[(u16, u16, u16, u16)],
    ) -> &mut Self {
        let mut info = Vec::new();
        info.write_u16::<BigEndian>(max_stack).unwrap();
        info.write_u16::<BigEndian>(max_locals).unwrap();
        info.write_u32::<BigEndian>(code.len() as u32).unwrap();
        info.extend_from_slice(code);
        info.write_u16::<BigEndian>(exception_table.len() as u16).unwrap();
        for (start, end, handler, catch_type) in exception_table {
            for value in [start, end, handler, catch_type] {
                info.write_u16::<BigEndian>(*value).unwrap();
            }
        }
        info.write_u16::<BigEndian>(0).unwrap();
        let code_index = self.utf8("Code");
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.methods.push(Member {
            access_flags: ACC_PUBLIC | ACC_STATIC,
            name_index,
            descriptor_index,
            attributes: vec![(code_index, info)],
        });
        self
    }

    pub fn method_without_code(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.raw_method(ACC_PUBLIC | ACC_STATIC, name_index, descriptor_index)
    }

    /// Add a method record pointing at arbitrary pool indices.
    pub fn raw_method(
        &mut self,
        access_flags: u16,
        name_index: u16,
        descriptor_index: u16,
    ) -> &mut Self {
        self.methods.push(Member {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self
    }

    pub fn class_attribute(&mut self, name: &str, info: &[u8]) -> &mut Self {
        let name_index = self.utf8(name);
        self.attributes.push((name_index, info.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(MAGIC).unwrap();
        out.write_u16::<BigEndian>(0).unwrap();
        out.write_u16::<BigEndian>(52).unwrap();
        out.write_u16::<BigEndian>(self.next_index).unwrap();
        for (tag, bytes, _) in &self.constants {
            out.write_u8(tag.byte()).unwrap();
            if *tag == ConstantTag::Utf8 {
                out.write_u16::<BigEndian>(bytes.len() as u16).unwrap();
            }
            out.extend_from_slice(bytes);
        }
        out.write_u16::<BigEndian>(ACC_PUBLIC).unwrap();
        out.write_u16::<BigEndian>(self.this_class).unwrap();
        out.write_u16::<BigEndian>(self.super_class).unwrap();
        out.write_u16::<BigEndian>(0).unwrap();
        for members in [&self.fields, &self.methods] {
            out.write_u16::<BigEndian>(members.len() as u16).unwrap();
            for member in members {
                out.write_u16::<BigEndian>(member.access_flags).unwrap();
                out.write_u16::<BigEndian>(member.name_index).unwrap();
                out.write_u16::<BigEndian>(member.descriptor_index).unwrap();
                write_attributes(&mut out, &member.attributes);
            }
        }
        write_attributes(&mut out, &self.attributes);
        out
    }
}

/// Encode `value` the way `javac` writes `Utf8` constants.
fn modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

fn pair(a: u16, b: u16) -> Vec<u8> {
    let mut bytes = a.to_be_bytes().to_vec();
    bytes.extend_from_slice(&b.to_be_bytes());
    bytes
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    out.write_u16::<BigEndian>(attributes.len() as u16).unwrap();
    for (name_index, info) in attributes {
        out.write_u16::<BigEndian>(*name_index).unwrap();
        out.write_u32::<BigEndian>(info.len() as u32).unwrap();
        out.extend_from_slice(info);
    }
}
