//! Metadata adapters: the capability set scanners extract facts through.
//!
//! Two interchangeable variants exist. [`ClassFileAdapter`] decodes raw
//! class-file bytes and never resolves anything, so it tolerates missing
//! dependencies and is the default for bulk scanning. [`ModelAdapter`]
//! reads an already-materialized type model and fails descriptor
//! construction when a type or one of its transitive supertypes is not
//! registered. Scanners only ever call the [`MetadataAdapter`] trait and
//! never branch on the concrete variant.

mod classfile_adapter;
mod model;

pub use classfile_adapter::ClassFileAdapter;
pub use model::{ModelAdapter, ModelField, ModelMethod, TypeModel, TypeModelSet};

use crate::classfile::ClassFileError;

/// One container entry, as handed to scanners. `data` is only filled when
/// a scanner that needs a descriptor accepted the entry.
#[derive(Debug, Clone)]
pub struct ScanUnit {
    /// Path relative to the scanned root, `/`-separated.
    pub relative_path: String,
    /// Last path segment.
    pub name: String,
    pub data: Vec<u8>,
}

impl ScanUnit {
    pub fn new(relative_path: impl Into<String>, data: Vec<u8>) -> Self {
        let relative_path = relative_path.into();
        let name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path.as_str())
            .to_string();
        Self {
            relative_path,
            name,
            data,
        }
    }

    /// The relative path with `/` replaced by `.`, matched against name
    /// filters alongside the raw path.
    pub fn dotted_path(&self) -> String {
        self.relative_path.replace('/', ".")
    }
}

/// One reference from a callable's body to another member.
#[derive(Debug, Clone)]
pub struct MemberUsage {
    /// Full key of the referenced member: `owner.field` for field access,
    /// `owner.name(types)` for calls.
    pub target: String,
    /// Source line of the reference, when line tables were compiled in.
    pub line: Option<u16>,
}

/// Structural fact extraction over opaque type, field and callable
/// descriptors.
///
/// Every operation is a pure read; [`MetadataAdapter::create_descriptor`]
/// is the only one that can fail.
pub trait MetadataAdapter: Send + Sync {
    type Class;
    type Field;
    type Method;

    /// Whether this adapter can build a descriptor from an entry at the
    /// given relative path.
    fn accepts_input(&self, path: &str) -> bool {
        path.ends_with(".class")
    }

    fn create_descriptor(&self, unit: &ScanUnit) -> Result<Self::Class, ClassFileError>;

    fn class_name<'c>(&self, class: &'c Self::Class) -> &'c str;
    /// Direct supertype name, empty when the type has none.
    fn super_name<'c>(&self, class: &'c Self::Class) -> &'c str;
    fn interface_names<'c>(&self, class: &'c Self::Class) -> &'c [String];
    fn class_annotations<'c>(&self, class: &'c Self::Class) -> &'c [String];
    fn is_public_class(&self, class: &Self::Class) -> bool;

    fn fields<'c>(&self, class: &'c Self::Class) -> &'c [Self::Field];
    fn field_name<'c>(&self, field: &'c Self::Field) -> &'c str;
    fn field_annotations<'c>(&self, field: &'c Self::Field) -> &'c [String];
    fn is_public_field(&self, field: &Self::Field) -> bool;

    fn methods<'c>(&self, class: &'c Self::Class) -> &'c [Self::Method];
    fn method_name<'c>(&self, method: &'c Self::Method) -> &'c str;
    /// Ordered parameter type names, rendered (`int`, `java.lang.String[]`).
    fn parameter_types<'c>(&self, method: &'c Self::Method) -> &'c [String];
    fn return_type<'c>(&self, method: &'c Self::Method) -> &'c str;
    fn method_annotations<'c>(&self, method: &'c Self::Method) -> &'c [String];
    /// Annotations declared on one parameter position.
    fn parameter_annotations<'c>(&self, method: &'c Self::Method, parameter: usize)
        -> &'c [String];
    /// Declared parameter names, empty when not compiled in.
    fn parameter_names<'c>(&self, method: &'c Self::Method) -> &'c [String];
    fn is_public_method(&self, method: &Self::Method) -> bool;

    /// Members referenced from the callable's body. Only the binary
    /// adapter can see bodies; the model variant reports nothing.
    fn member_usages(&self, _method: &Self::Method) -> Vec<MemberUsage> {
        Vec::new()
    }

    /// Overload-safe key: name plus the ordered parameter type list.
    fn method_key(&self, method: &Self::Method) -> String {
        format!(
            "{}({})",
            self.method_name(method),
            self.parameter_types(method).join(", ")
        )
    }

    /// [`MetadataAdapter::method_key`] prefixed with the owning type.
    fn method_full_key(&self, class: &Self::Class, method: &Self::Method) -> String {
        format!("{}.{}", self.class_name(class), self.method_key(method))
    }

    fn field_full_key(&self, class: &Self::Class, field: &Self::Field) -> String {
        format!("{}.{}", self.class_name(class), self.field_name(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_unit_name_is_last_segment() {
        let unit = ScanUnit::new("com/x/Foo.class", Vec::new());
        assert_eq!(unit.name, "Foo.class");
        assert_eq!(unit.dotted_path(), "com.x.Foo.class");

        let flat = ScanUnit::new("web.xml", Vec::new());
        assert_eq!(flat.name, "web.xml");
    }
}
