//! Binary descriptor adapter backed by the class-file decoder.

use crate::classfile::{ClassFile, ClassFileError, FieldInfo, MemberRefKind, MethodInfo};

use super::{MemberUsage, MetadataAdapter, ScanUnit};

/// Extracts facts straight from class-file bytes. Nothing is resolved or
/// loaded, so entries with missing dependencies still scan cleanly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFileAdapter;

impl ClassFileAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataAdapter for ClassFileAdapter {
    type Class = ClassFile;
    type Field = FieldInfo;
    type Method = MethodInfo;

    fn create_descriptor(&self, unit: &ScanUnit) -> Result<ClassFile, ClassFileError> {
        ClassFile::parse(&unit.data)
    }

    fn class_name<'c>(&self, class: &'c ClassFile) -> &'c str {
        &class.name
    }

    fn super_name<'c>(&self, class: &'c ClassFile) -> &'c str {
        &class.super_name
    }

    fn interface_names<'c>(&self, class: &'c ClassFile) -> &'c [String] {
        &class.interfaces
    }

    fn class_annotations<'c>(&self, class: &'c ClassFile) -> &'c [String] {
        &class.annotations
    }

    fn is_public_class(&self, class: &ClassFile) -> bool {
        class.is_public()
    }

    fn fields<'c>(&self, class: &'c ClassFile) -> &'c [FieldInfo] {
        &class.fields
    }

    fn field_name<'c>(&self, field: &'c FieldInfo) -> &'c str {
        &field.name
    }

    fn field_annotations<'c>(&self, field: &'c FieldInfo) -> &'c [String] {
        &field.annotations
    }

    fn is_public_field(&self, field: &FieldInfo) -> bool {
        field.is_public()
    }

    fn methods<'c>(&self, class: &'c ClassFile) -> &'c [MethodInfo] {
        &class.methods
    }

    fn method_name<'c>(&self, method: &'c MethodInfo) -> &'c str {
        &method.name
    }

    fn parameter_types<'c>(&self, method: &'c MethodInfo) -> &'c [String] {
        &method.parameter_types
    }

    fn return_type<'c>(&self, method: &'c MethodInfo) -> &'c str {
        &method.return_type
    }

    fn method_annotations<'c>(&self, method: &'c MethodInfo) -> &'c [String] {
        &method.annotations
    }

    fn parameter_annotations<'c>(&self, method: &'c MethodInfo, parameter: usize) -> &'c [String] {
        method
            .parameter_annotations
            .get(parameter)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn parameter_names<'c>(&self, method: &'c MethodInfo) -> &'c [String] {
        &method.parameter_names
    }

    fn is_public_method(&self, method: &MethodInfo) -> bool {
        method.is_public()
    }

    fn member_usages(&self, method: &MethodInfo) -> Vec<MemberUsage> {
        method
            .member_refs
            .iter()
            .map(|member| MemberUsage {
                target: match member.kind {
                    MemberRefKind::Field => format!("{}.{}", member.owner, member.name),
                    MemberRefKind::Method => format!(
                        "{}.{}({})",
                        member.owner,
                        member.name,
                        member.parameter_types.join(", ")
                    ),
                },
                line: member.line,
            })
            .collect()
    }
}
