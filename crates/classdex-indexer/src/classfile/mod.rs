//! Streaming decoder for JVM class files.
//!
//! Parses the constant pool, type hierarchy, members, runtime annotation
//! attributes and method bodies into an owned [`ClassFile`] model. Type
//! and member descriptors are rendered into readable dotted names at parse
//! time, so a constructed model never fails later lookups.

mod descriptor;
mod pool;
mod reader;

use std::string::FromUtf8Error;

use thiserror::Error;

use pool::{ConstantPool, RefKind};
use reader::ClassReader;

pub(crate) const ACC_PUBLIC: u16 = 0x0001;
pub(crate) const ACC_STATIC: u16 = 0x0008;
pub(crate) const ACC_INTERFACE: u16 = 0x0200;
pub(crate) const ACC_ANNOTATION: u16 = 0x2000;

/// Errors produced while decoding a class file.
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Input ended before a complete structure was read.
    #[error("unexpected end of class file")]
    UnexpectedEof,

    /// The leading magic number was not 0xCAFEBABE.
    #[error("bad class file magic: {0:#010x}")]
    BadMagic(u32),

    /// A constant pool tag this decoder does not recognize.
    #[error("unsupported constant pool tag: {0}")]
    UnsupportedConstant(u8),

    /// A constant pool index pointed at a missing or mismatched entry.
    #[error("bad constant pool index: {0}")]
    BadConstantIndex(u16),

    /// A modified-UTF8 string in the pool failed to decode.
    #[error("invalid utf8 in constant pool")]
    Utf8(#[from] FromUtf8Error),

    /// A field or method descriptor did not follow the grammar.
    #[error("malformed descriptor: {0}")]
    BadDescriptor(String),

    /// An attribute body did not follow its documented layout.
    #[error("malformed {0} attribute")]
    BadAttribute(&'static str),

    /// Type resolution could not find a referenced type.
    #[error("type {owner} references unresolved type {missing}")]
    MissingDependency { owner: String, missing: String },

    /// No model was registered for the requested type.
    #[error("no type model registered for {0}")]
    UnknownType(String),
}

/// Whether a member reference targets a field or a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRefKind {
    Field,
    Method,
}

/// A field read/write or method/constructor call recorded from a method
/// body, attributed to the source line of the call site when available.
#[derive(Debug, Clone)]
pub struct MemberRef {
    pub kind: MemberRefKind,
    pub owner: String,
    pub name: String,
    /// Rendered parameter types of the callee. Empty for field accesses.
    pub parameter_types: Vec<String>,
    pub line: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub type_name: String,
    pub access_flags: u16,
    pub annotations: Vec<String>,
}

impl FieldInfo {
    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub access_flags: u16,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub annotations: Vec<String>,
    /// Annotations per parameter position, visible and invisible merged.
    pub parameter_annotations: Vec<Vec<String>>,
    /// Declared parameter names, empty when the class was compiled
    /// without them.
    pub parameter_names: Vec<String>,
    pub member_refs: Vec<MemberRef>,
}

impl MethodInfo {
    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }
}

/// Owned model of a single parsed class file. All type names are dotted
/// (`com.x.Foo`, `int[]`).
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub name: String,
    /// Empty for `java.lang.Object` and module-info classes.
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub annotations: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = ClassReader::new(bytes);

        let magic = reader.read_u4()?;
        if magic != 0xCAFE_BABE {
            return Err(ClassFileError::BadMagic(magic));
        }
        // minor and major version
        reader.skip(4)?;

        let pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let name = dotted(pool.class_name(reader.read_u2()?)?);
        let super_index = reader.read_u2()?;
        let super_name = if super_index == 0 {
            String::new()
        } else {
            dotted(pool.class_name(super_index)?)
        };

        let interface_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(dotted(pool.class_name(reader.read_u2()?)?));
        }

        let field_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(parse_field(&mut reader, &pool)?);
        }

        let method_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(parse_method(&mut reader, &pool)?);
        }

        let mut annotations = Vec::new();
        let attribute_count = reader.read_u2()?;
        for _ in 0..attribute_count {
            let (attr_name, mut body) = read_attribute(&mut reader, &pool)?;
            if is_annotations_attribute(attr_name) {
                read_annotations(&mut body, &pool, &mut annotations)?;
            }
        }

        Ok(Self {
            name,
            super_name,
            interfaces,
            access_flags,
            annotations,
            fields,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags & ACC_ANNOTATION != 0
    }

    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }
}

fn dotted(internal: &str) -> String {
    internal.replace('/', ".")
}

fn is_annotations_attribute(name: &str) -> bool {
    name == "RuntimeVisibleAnnotations" || name == "RuntimeInvisibleAnnotations"
}

/// Read one attribute header and hand back its name plus a reader scoped
/// to exactly the attribute body, so malformed bodies cannot overrun.
fn read_attribute<'d, 'p>(
    reader: &mut ClassReader<'d>,
    pool: &'p ConstantPool,
) -> Result<(&'p str, ClassReader<'d>), ClassFileError> {
    let name_index = reader.read_u2()?;
    let length = reader.read_u4()? as usize;
    let body = reader.read_slice(length)?;
    Ok((pool.utf8(name_index)?, ClassReader::new(body)))
}

fn parse_field(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<FieldInfo, ClassFileError> {
    let access_flags = reader.read_u2()?;
    let name = pool.utf8(reader.read_u2()?)?.to_string();
    let type_name = descriptor::type_name(pool.utf8(reader.read_u2()?)?)?;

    let mut annotations = Vec::new();
    let attribute_count = reader.read_u2()?;
    for _ in 0..attribute_count {
        let (attr_name, mut body) = read_attribute(reader, pool)?;
        if is_annotations_attribute(attr_name) {
            read_annotations(&mut body, pool, &mut annotations)?;
        }
    }

    Ok(FieldInfo {
        name,
        type_name,
        access_flags,
        annotations,
    })
}

struct LocalVariable {
    start_pc: u16,
    slot: u16,
    name: String,
}

fn parse_method(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<MethodInfo, ClassFileError> {
    let access_flags = reader.read_u2()?;
    let name = pool.utf8(reader.read_u2()?)?.to_string();
    let raw_descriptor = pool.utf8(reader.read_u2()?)?.to_string();
    let (parameter_types, return_type) = descriptor::method_signature(&raw_descriptor)?;

    let mut annotations = Vec::new();
    let mut parameter_annotations: Vec<Vec<String>> = Vec::new();
    let mut declared_names: Option<Vec<String>> = None;
    let mut locals: Vec<LocalVariable> = Vec::new();
    let mut member_refs: Vec<MemberRef> = Vec::new();

    let attribute_count = reader.read_u2()?;
    for _ in 0..attribute_count {
        let (attr_name, mut body) = read_attribute(reader, pool)?;
        match attr_name {
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                read_annotations(&mut body, pool, &mut annotations)?;
            }
            "RuntimeVisibleParameterAnnotations"
            | "RuntimeInvisibleParameterAnnotations" => {
                read_parameter_annotations(&mut body, pool, &mut parameter_annotations)?;
            }
            "MethodParameters" => {
                declared_names = Some(read_method_parameters(&mut body, pool)?);
            }
            "Code" => {
                read_code(&mut body, pool, &mut locals, &mut member_refs)?;
            }
            _ => {}
        }
    }

    let parameter_names = match declared_names {
        Some(names) => names,
        None => local_parameter_names(&parameter_types, access_flags, &locals),
    };

    Ok(MethodInfo {
        name,
        access_flags,
        parameter_types,
        return_type,
        annotations,
        parameter_annotations,
        parameter_names,
        member_refs,
    })
}

fn read_annotations(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    out: &mut Vec<String>,
) -> Result<(), ClassFileError> {
    let count = reader.read_u2()?;
    for _ in 0..count {
        out.push(read_annotation(reader, pool)?);
    }
    Ok(())
}

/// Decode one annotation structure, returning its rendered type name.
/// Element values are walked for length only.
fn read_annotation(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<String, ClassFileError> {
    let type_index = reader.read_u2()?;
    let name = descriptor::type_name(pool.utf8(type_index)?)?;
    let pair_count = reader.read_u2()?;
    for _ in 0..pair_count {
        // element name index
        reader.skip(2)?;
        skip_element_value(reader, pool)?;
    }
    Ok(name)
}

fn skip_element_value(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<(), ClassFileError> {
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2)?,
        b'e' => reader.skip(4)?,
        b'@' => {
            read_annotation(reader, pool)?;
        }
        b'[' => {
            let count = reader.read_u2()?;
            for _ in 0..count {
                skip_element_value(reader, pool)?;
            }
        }
        _ => return Err(ClassFileError::BadAttribute("RuntimeAnnotations")),
    }
    Ok(())
}

fn read_parameter_annotations(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    out: &mut Vec<Vec<String>>,
) -> Result<(), ClassFileError> {
    let parameter_count = reader.read_u1()? as usize;
    if out.len() < parameter_count {
        out.resize(parameter_count, Vec::new());
    }
    for slot in out.iter_mut().take(parameter_count) {
        let count = reader.read_u2()?;
        for _ in 0..count {
            slot.push(read_annotation(reader, pool)?);
        }
    }
    Ok(())
}

fn read_method_parameters(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<String>, ClassFileError> {
    let count = reader.read_u1()? as usize;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        // parameter access flags
        reader.skip(2)?;
        if name_index == 0 {
            names.push(String::new());
        } else {
            names.push(pool.utf8(name_index)?.to_string());
        }
    }
    Ok(names)
}

fn read_code(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    locals: &mut Vec<LocalVariable>,
    member_refs: &mut Vec<MemberRef>,
) -> Result<(), ClassFileError> {
    // max_stack and max_locals
    reader.skip(4)?;
    let code_length = reader.read_u4()? as usize;
    let code = reader.read_slice(code_length)?;
    let exception_count = reader.read_u2()? as usize;
    reader.skip(exception_count * 8)?;

    let mut line_numbers: Vec<(u16, u16)> = Vec::new();
    let attribute_count = reader.read_u2()?;
    for _ in 0..attribute_count {
        let (attr_name, mut body) = read_attribute(reader, pool)?;
        match attr_name {
            "LineNumberTable" => {
                let count = body.read_u2()?;
                for _ in 0..count {
                    line_numbers.push((body.read_u2()?, body.read_u2()?));
                }
            }
            "LocalVariableTable" => {
                let count = body.read_u2()?;
                for _ in 0..count {
                    let start_pc = body.read_u2()?;
                    // scope length
                    body.skip(2)?;
                    let name_index = body.read_u2()?;
                    // descriptor index
                    body.skip(2)?;
                    let slot = body.read_u2()?;
                    locals.push(LocalVariable {
                        start_pc,
                        slot,
                        name: pool.utf8(name_index)?.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    collect_member_refs(code, pool, &line_numbers, member_refs);
    Ok(())
}

/// Walk the bytecode and record every field access and method call.
/// Stops quietly at the first opcode the length table does not cover.
fn collect_member_refs(
    code: &[u8],
    pool: &ConstantPool,
    line_numbers: &[(u16, u16)],
    out: &mut Vec<MemberRef>,
) {
    let mut pc = 0usize;
    while pc < code.len() {
        let opcode = code[pc];
        if (0xb2..=0xb9).contains(&opcode) {
            if let Some(index) = read_u16_at(code, pc + 1) {
                if let Some(member) = resolve_ref(pool, index, line_for(line_numbers, pc)) {
                    out.push(member);
                }
            }
        }
        match instruction_length(code, pc) {
            Some(length) => pc += length,
            None => break,
        }
    }
}

fn resolve_ref(pool: &ConstantPool, index: u16, line: Option<u16>) -> Option<MemberRef> {
    let resolved = pool.member_ref(index).ok()?;
    let owner = descriptor::owner_name(&resolved.owner).ok()?;
    let (kind, parameter_types) = match resolved.kind {
        RefKind::Field => (MemberRefKind::Field, Vec::new()),
        RefKind::Method => {
            let (parameters, _) = descriptor::method_signature(&resolved.descriptor).ok()?;
            (MemberRefKind::Method, parameters)
        }
    };
    Some(MemberRef {
        kind,
        owner,
        name: resolved.name,
        parameter_types,
        line,
    })
}

fn read_u16_at(code: &[u8], at: usize) -> Option<u16> {
    let bytes = code.get(at..at.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_i32_at(code: &[u8], at: usize) -> Option<i32> {
    let bytes = code.get(at..at.checked_add(4)?)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Source line covering `pc`: the line table row with the greatest
/// `start_pc` not past it.
fn line_for(line_numbers: &[(u16, u16)], pc: usize) -> Option<u16> {
    let mut best: Option<(u16, u16)> = None;
    for &(start_pc, line) in line_numbers {
        if usize::from(start_pc) <= pc && best.map_or(true, |(at, _)| start_pc >= at) {
            best = Some((start_pc, line));
        }
    }
    best.map(|(_, line)| line)
}

/// Byte length of the instruction at `pc`, including the opcode itself.
/// `None` for reserved or unknown opcodes.
fn instruction_length(code: &[u8], pc: usize) -> Option<usize> {
    let opcode = *code.get(pc)?;
    let length = match opcode {
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 => 1,
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | 0x84 | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        0xb9 | 0xba | 0xc8 | 0xc9 => 5,
        // wide: two extra operand bytes, four when wrapping iinc
        0xc4 => {
            if code.get(pc + 1).copied() == Some(0x84) {
                6
            } else {
                4
            }
        }
        // tableswitch: operands are 4-byte aligned from the start of code
        0xaa => {
            let base = pc + 1;
            let pad = (4 - base % 4) % 4;
            let low = read_i32_at(code, base + pad + 4)?;
            let high = read_i32_at(code, base + pad + 8)?;
            let count = i64::from(high) - i64::from(low) + 1;
            if count < 0 {
                return None;
            }
            1 + pad + 12 + (count as usize) * 4
        }
        // lookupswitch: same alignment, npairs of 8 bytes each
        0xab => {
            let base = pc + 1;
            let pad = (4 - base % 4) % 4;
            let npairs = read_i32_at(code, base + pad + 4)?;
            if npairs < 0 {
                return None;
            }
            1 + pad + 8 + (npairs as usize) * 8
        }
        _ => return None,
    };
    Some(length)
}

/// Recover parameter names from the local variable table. A parameter
/// occupies the local slot at `start_pc == 0`, starting after `this` for
/// instance methods, two slots wide for `long` and `double`.
fn local_parameter_names(
    parameter_types: &[String],
    access_flags: u16,
    locals: &[LocalVariable],
) -> Vec<String> {
    if locals.is_empty() {
        return Vec::new();
    }
    let mut slot: u16 = if access_flags & ACC_STATIC != 0 { 0 } else { 1 };
    let mut names = Vec::with_capacity(parameter_types.len());
    for parameter in parameter_types {
        match locals
            .iter()
            .find(|local| local.slot == slot && local.start_pc == 0)
        {
            Some(local) => names.push(local.name.clone()),
            // a partial table would misalign the remaining names
            None => return Vec::new(),
        }
        slot += if parameter == "long" || parameter == "double" {
            2
        } else {
            1
        };
    }
    names.retain(|name| !name.starts_with("this$"));
    names
}
