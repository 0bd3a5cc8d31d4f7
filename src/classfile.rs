//! Static reading of JVM class files.
//!
//! Only the constant pool and the field/method descriptors are decoded;
//! code and other attributes are skipped. Nothing is loaded or executed.

use std::collections::BTreeSet;

use crate::error::ExtractError;

const MAGIC: u32 = 0xCAFE_BABE;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELD_REF: u8 = 9;
const TAG_METHOD_REF: u8 = 10;
const TAG_INTERFACE_METHOD_REF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// A class name plus every class name its binary symbolically references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassReferences {
    pub name: String,
    pub referenced: BTreeSet<String>,
}

/// Collects class constants, array element types and every class named in a
/// field, method or call-site descriptor. The class's own name is excluded.
pub fn extract_references(bytes: &[u8]) -> Result<ClassReferences, ExtractError> {
    let (pool, name, mut reader) = parse_header(bytes)?;
    let mut referenced = BTreeSet::new();

    for constant in &pool {
        match constant {
            Some(Constant::Class(name_index)) => {
                add_class_name(pool_utf8(&pool, *name_index)?, &mut referenced);
            }
            Some(Constant::NameAndType(descriptor)) | Some(Constant::MethodType(descriptor)) => {
                add_descriptor_types(pool_utf8(&pool, *descriptor)?, &mut referenced);
            }
            _ => {}
        }
    }

    let super_class = reader.u2()?;
    if super_class != 0 {
        pool_class(&pool, super_class)?;
    }
    let interfaces = reader.u2()?;
    reader.skip(usize::from(interfaces) * 2)?;

    // fields, then methods
    for _ in 0..2 {
        let members = reader.u2()?;
        for _ in 0..members {
            reader.skip(4)?;
            let descriptor = reader.u2()?;
            add_descriptor_types(pool_utf8(&pool, descriptor)?, &mut referenced);
            skip_attributes(&mut reader)?;
        }
    }

    referenced.remove(&name);
    Ok(ClassReferences { name, referenced })
}

#[derive(Debug)]
enum Constant {
    Utf8(String),
    Class(u16),
    NameAndType(u16),
    MethodType(u16),
    Other,
}

fn parse_header(bytes: &[u8]) -> Result<(Vec<Option<Constant>>, String, Reader<'_>), ExtractError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.u4()?;
    if magic != MAGIC {
        return Err(ExtractError::BadMagic(magic));
    }
    reader.skip(4)?;

    let pool = read_constant_pool(&mut reader)?;
    reader.skip(2)?;
    let this_class = reader.u2()?;
    let name = pool_class(&pool, this_class)?.replace('/', ".");
    Ok((pool, name, reader))
}

fn read_constant_pool(reader: &mut Reader<'_>) -> Result<Vec<Option<Constant>>, ExtractError> {
    let count = reader.u2()?;
    let mut pool: Vec<Option<Constant>> = Vec::with_capacity(usize::from(count));
    // index 0 is unused by the format
    pool.push(None);

    let mut index = 1u16;
    while index < count {
        let tag = reader.u1()?;
        let constant = match tag {
            TAG_UTF8 => {
                let len = reader.u2()?;
                let raw = reader.take(usize::from(len))?;
                Constant::Utf8(String::from_utf8_lossy(raw).into_owned())
            }
            TAG_CLASS => Constant::Class(reader.u2()?),
            TAG_NAME_AND_TYPE => {
                reader.skip(2)?;
                Constant::NameAndType(reader.u2()?)
            }
            TAG_METHOD_TYPE => Constant::MethodType(reader.u2()?),
            TAG_STRING | TAG_MODULE | TAG_PACKAGE => {
                reader.skip(2)?;
                Constant::Other
            }
            TAG_METHOD_HANDLE => {
                reader.skip(3)?;
                Constant::Other
            }
            TAG_INTEGER | TAG_FLOAT | TAG_FIELD_REF | TAG_METHOD_REF
            | TAG_INTERFACE_METHOD_REF | TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => {
                reader.skip(4)?;
                Constant::Other
            }
            TAG_LONG | TAG_DOUBLE => {
                reader.skip(8)?;
                pool.push(Some(Constant::Other));
                pool.push(None);
                index = index.saturating_add(2);
                continue;
            }
            _ => return Err(ExtractError::UnknownTag { tag, index }),
        };
        pool.push(Some(constant));
        index += 1;
    }

    Ok(pool)
}

fn pool_utf8(pool: &[Option<Constant>], index: u16) -> Result<&str, ExtractError> {
    match pool.get(usize::from(index)) {
        Some(Some(Constant::Utf8(value))) => Ok(value),
        _ => Err(ExtractError::InvalidConstant {
            index,
            expected: "Utf8",
        }),
    }
}

fn pool_class(pool: &[Option<Constant>], index: u16) -> Result<&str, ExtractError> {
    match pool.get(usize::from(index)) {
        Some(Some(Constant::Class(name_index))) => pool_utf8(pool, *name_index),
        _ => Err(ExtractError::InvalidConstant {
            index,
            expected: "Class",
        }),
    }
}

fn add_class_name(internal: &str, out: &mut BTreeSet<String>) {
    if internal.starts_with('[') {
        add_descriptor_types(internal, out);
    } else if !internal.is_empty() {
        out.insert(internal.replace('/', "."));
    }
}

/// Pulls every `L<name>;` type out of a field or method descriptor.
fn add_descriptor_types(descriptor: &str, out: &mut BTreeSet<String>) {
    let mut rest = descriptor;
    while let Some(start) = rest.find('L') {
        let after = &rest[start + 1..];
        let Some(end) = after.find(';') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() {
            out.insert(name.replace('/', "."));
        }
        rest = &after[end + 1..];
    }
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<(), ExtractError> {
    let count = reader.u2()?;
    for _ in 0..count {
        reader.skip(2)?;
        let len = reader.u4()?;
        reader.skip(len as usize)?;
    }
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ExtractError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ExtractError::Truncated { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), ExtractError> {
        self.take(n).map(|_| ())
    }

    fn u1(&mut self) -> Result<u8, ExtractError> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16, ExtractError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32, ExtractError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
