//! Constant pool parsing and lookups.

use super::reader::ClassReader;
use super::ClassFileError;

/// Kind of a resolved member reference constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Field,
    Method,
}

/// A member reference resolved through the pool: owner class (slashed),
/// member name, and raw descriptor string.
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    pub kind: RefKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class {
        name_index: u16,
    },
    MemberRef {
        kind: RefKind,
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    Other,
    // Index 0 and the slot after an 8-byte constant
    Unusable,
}

pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassFileError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                // Utf8
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    Constant::Utf8(String::from_utf8(bytes.to_vec())?)
                }
                // Integer, Float
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                // Long, Double take two pool slots
                5 | 6 => {
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                // Class
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                // String
                8 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                // Fieldref
                9 => Constant::MemberRef {
                    kind: RefKind::Field,
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                // Methodref, InterfaceMethodref
                10 | 11 => Constant::MemberRef {
                    kind: RefKind::Method,
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                // NameAndType
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                // MethodHandle
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                // MethodType
                16 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                // Dynamic, InvokeDynamic
                17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                // Module, Package
                19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                other => return Err(ClassFileError::UnsupportedConstant(other)),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassFileError::BadConstantIndex(index))
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }

    /// Slashed internal name of a Class constant.
    pub(crate) fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }

    /// Resolve a Fieldref/Methodref/InterfaceMethodref constant.
    pub(crate) fn member_ref(&self, index: u16) -> Result<ResolvedRef, ClassFileError> {
        match self.get(index)? {
            Constant::MemberRef {
                kind,
                class_index,
                name_and_type_index,
            } => {
                let owner = self.class_name(*class_index)?.to_string();
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(ResolvedRef {
                    kind: *kind,
                    owner,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFileError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }
}
