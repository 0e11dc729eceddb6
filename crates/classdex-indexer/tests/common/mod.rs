//! Hand-assembled class-file fixtures, so integration tests need no JVM
//! toolchain. The builder emits just enough of the format for the
//! decoder: constant pool, hierarchy, members, runtime annotation
//! attributes, parameter tables and small method bodies.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ANNOTATION: u16 = 0x2000;

#[derive(Default)]
struct Pool {
    entries: Vec<Vec<u8>>,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    fn utf8(&mut self, text: &str) -> u16 {
        if let Some(&index) = self.utf8.get(text) {
            return index;
        }
        let mut entry = vec![1u8];
        entry.extend((text.len() as u16).to_be_bytes());
        entry.extend(text.as_bytes());
        let index = self.push(entry);
        self.utf8.insert(text.to_string(), index);
        index
    }

    fn class(&mut self, dotted: &str) -> u16 {
        if let Some(&index) = self.classes.get(dotted) {
            return index;
        }
        let name = self.utf8(&dotted.replace('.', "/"));
        let mut entry = vec![7u8];
        entry.extend(name.to_be_bytes());
        let index = self.push(entry);
        self.classes.insert(dotted.to_string(), index);
        index
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut entry = vec![12u8];
        entry.extend(name.to_be_bytes());
        entry.extend(descriptor.to_be_bytes());
        self.push(entry)
    }

    fn member_ref(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name_and_type = self.name_and_type(name, descriptor);
        let mut entry = vec![tag];
        entry.extend(class.to_be_bytes());
        entry.extend(name_and_type.to_be_bytes());
        self.push(entry)
    }

    fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(((self.entries.len() + 1) as u16).to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
        out
    }
}

/// Annotation type descriptor for a dotted name: `Lcom/t/Tag;`.
fn annotation_descriptor(dotted: &str) -> String {
    format!("L{};", dotted.replace('.', "/"))
}

fn attribute(pool: &mut Pool, name: &str, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(pool.utf8(name).to_be_bytes());
    out.extend((body.len() as u32).to_be_bytes());
    out.extend(body);
    out
}

fn annotations_body(pool: &mut Pool, annotations: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((annotations.len() as u16).to_be_bytes());
    for annotation in annotations {
        let type_index = pool.utf8(&annotation_descriptor(annotation));
        body.extend(type_index.to_be_bytes());
        body.extend(0u16.to_be_bytes()); // no element-value pairs
    }
    body
}

#[derive(Clone)]
pub struct Field {
    name: String,
    descriptor: String,
    access: u16,
    annotations: Vec<String>,
}

impl Field {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: ACC_PUBLIC,
            annotations: Vec::new(),
        }
    }

    pub fn annotate(mut self, tag: &str) -> Self {
        self.annotations.push(tag.to_string());
        self
    }
}

#[derive(Clone)]
pub struct Method {
    name: String,
    descriptor: String,
    access: u16,
    annotations: Vec<String>,
    parameter_annotations: Vec<Vec<String>>,
    parameter_names: Vec<String>,
    /// (owner, name, method descriptor, line) per static call emitted.
    calls: Vec<(String, String, String, u16)>,
    /// (owner, name, field descriptor, line) per static read emitted.
    field_reads: Vec<(String, String, String, u16)>,
}

impl Method {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: ACC_PUBLIC | ACC_STATIC,
            annotations: Vec::new(),
            parameter_annotations: Vec::new(),
            parameter_names: Vec::new(),
            calls: Vec::new(),
            field_reads: Vec::new(),
        }
    }

    pub fn annotate(mut self, tag: &str) -> Self {
        self.annotations.push(tag.to_string());
        self
    }

    pub fn param_annotation(mut self, position: usize, tag: &str) -> Self {
        if self.parameter_annotations.len() <= position {
            self.parameter_annotations.resize(position + 1, Vec::new());
        }
        self.parameter_annotations[position].push(tag.to_string());
        self
    }

    pub fn param_names(mut self, names: &[&str]) -> Self {
        self.parameter_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn calls(mut self, owner: &str, name: &str, descriptor: &str, line: u16) -> Self {
        self.calls
            .push((owner.into(), name.into(), descriptor.into(), line));
        self
    }

    pub fn reads_field(mut self, owner: &str, name: &str, descriptor: &str, line: u16) -> Self {
        self.field_reads
            .push((owner.into(), name.into(), descriptor.into(), line));
        self
    }
}

/// Declarative class-file description, serialized on [`ClassBytes::build`].
pub struct ClassBytes {
    name: String,
    super_name: String,
    interfaces: Vec<String>,
    access: u16,
    annotations: Vec<String>,
    fields: Vec<Field>,
    methods: Vec<Method>,
}

impl ClassBytes {
    pub fn class(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: "java.lang.Object".to_string(),
            interfaces: Vec::new(),
            access: ACC_PUBLIC,
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        let mut built = Self::class(name);
        built.access = ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT;
        built
    }

    pub fn annotation(name: &str) -> Self {
        let mut built = Self::interface(name);
        built.access |= ACC_ANNOTATION;
        built
            .interfaces
            .push("java.lang.annotation.Annotation".to_string());
        built
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_name = name.to_string();
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn annotate(mut self, tag: &str) -> Self {
        self.annotations.push(tag.to_string());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn relative_path(&self) -> String {
        format!("{}.class", self.name.replace('.', "/"))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this_class = pool.class(&self.name);
        let super_class = pool.class(&self.super_name);
        let mut interfaces = Vec::with_capacity(self.interfaces.len());
        for interface in &self.interfaces {
            interfaces.push(pool.class(interface));
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(serialize_field(&mut pool, field));
        }
        let mut methods = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            methods.push(serialize_method(&mut pool, method));
        }
        let mut class_attrs = Vec::new();
        if !self.annotations.is_empty() {
            let body = annotations_body(&mut pool, &self.annotations);
            class_attrs.push(attribute(&mut pool, "RuntimeVisibleAnnotations", body));
        }

        let mut out = Vec::new();
        out.extend(0xCAFE_BABEu32.to_be_bytes());
        out.extend(0u16.to_be_bytes()); // minor
        out.extend(52u16.to_be_bytes()); // major
        out.extend(pool.bytes());
        out.extend(self.access.to_be_bytes());
        out.extend(this_class.to_be_bytes());
        out.extend(super_class.to_be_bytes());
        out.extend((interfaces.len() as u16).to_be_bytes());
        for interface in interfaces {
            out.extend(interface.to_be_bytes());
        }
        out.extend((fields.len() as u16).to_be_bytes());
        for field in fields {
            out.extend(field);
        }
        out.extend((methods.len() as u16).to_be_bytes());
        for method in methods {
            out.extend(method);
        }
        out.extend((class_attrs.len() as u16).to_be_bytes());
        for attr in class_attrs {
            out.extend(attr);
        }
        out
    }

    /// Write the built bytes under `root` at the class's relative path.
    pub fn write_to(&self, root: &Path) -> PathBuf {
        let target = root.join(self.relative_path());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&target, self.build()).unwrap();
        target
    }
}

fn serialize_field(pool: &mut Pool, field: &Field) -> Vec<u8> {
    let name = pool.utf8(&field.name);
    let descriptor = pool.utf8(&field.descriptor);
    let mut attrs = Vec::new();
    if !field.annotations.is_empty() {
        let body = annotations_body(pool, &field.annotations);
        attrs.push(attribute(pool, "RuntimeVisibleAnnotations", body));
    }

    let mut out = Vec::new();
    out.extend(field.access.to_be_bytes());
    out.extend(name.to_be_bytes());
    out.extend(descriptor.to_be_bytes());
    out.extend((attrs.len() as u16).to_be_bytes());
    for attr in attrs {
        out.extend(attr);
    }
    out
}

fn serialize_method(pool: &mut Pool, method: &Method) -> Vec<u8> {
    let name = pool.utf8(&method.name);
    let descriptor = pool.utf8(&method.descriptor);

    let mut attrs = Vec::new();
    if !method.annotations.is_empty() {
        let body = annotations_body(pool, &method.annotations);
        attrs.push(attribute(pool, "RuntimeVisibleAnnotations", body));
    }
    if !method.parameter_annotations.is_empty() {
        let mut body = vec![method.parameter_annotations.len() as u8];
        for slot in &method.parameter_annotations {
            body.extend(annotations_body(pool, slot));
        }
        attrs.push(attribute(
            pool,
            "RuntimeVisibleParameterAnnotations",
            body,
        ));
    }
    if !method.parameter_names.is_empty() {
        let mut body = vec![method.parameter_names.len() as u8];
        for parameter in &method.parameter_names {
            body.extend(pool.utf8(parameter).to_be_bytes());
            body.extend(0u16.to_be_bytes()); // parameter flags
        }
        attrs.push(attribute(pool, "MethodParameters", body));
    }
    if !method.calls.is_empty() || !method.field_reads.is_empty() {
        attrs.push(code_attribute(pool, method));
    }

    let mut out = Vec::new();
    out.extend(method.access.to_be_bytes());
    out.extend(name.to_be_bytes());
    out.extend(descriptor.to_be_bytes());
    out.extend((attrs.len() as u16).to_be_bytes());
    for attr in attrs {
        out.extend(attr);
    }
    out
}

/// A body of `getstatic`/`invokestatic` instructions ending in `return`,
/// with one line-number row per reference.
fn code_attribute(pool: &mut Pool, method: &Method) -> Vec<u8> {
    let mut code = Vec::new();
    let mut lines = Vec::new();
    for (owner, name, descriptor, line) in &method.field_reads {
        let index = pool.member_ref(9, owner, name, descriptor);
        lines.push((code.len() as u16, *line));
        code.push(0xb2); // getstatic
        code.extend(index.to_be_bytes());
    }
    for (owner, name, descriptor, line) in &method.calls {
        let index = pool.member_ref(10, owner, name, descriptor);
        lines.push((code.len() as u16, *line));
        code.push(0xb8); // invokestatic
        code.extend(index.to_be_bytes());
    }
    code.push(0xb1); // return

    let mut line_table = Vec::new();
    line_table.extend((lines.len() as u16).to_be_bytes());
    for (start_pc, line) in lines {
        line_table.extend(start_pc.to_be_bytes());
        line_table.extend(line.to_be_bytes());
    }
    let line_attr = attribute(pool, "LineNumberTable", line_table);

    let mut body = Vec::new();
    body.extend(2u16.to_be_bytes()); // max_stack
    body.extend(2u16.to_be_bytes()); // max_locals
    body.extend((code.len() as u32).to_be_bytes());
    body.extend(code);
    body.extend(0u16.to_be_bytes()); // exception table
    body.extend(1u16.to_be_bytes()); // one code attribute
    body.extend(line_attr);
    attribute(pool, "Code", body)
}
