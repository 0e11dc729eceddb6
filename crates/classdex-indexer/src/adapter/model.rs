//! Live-model adapter over an already-materialized type registry.
//!
//! The registry plays the role of a runtime's introspection facility:
//! descriptor construction looks the type up by name and requires its
//! whole supertype chain to be resolvable, which is exactly the failure
//! mode the binary adapter avoids.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::classfile::ClassFileError;

use super::{MetadataAdapter, ScanUnit};

#[derive(Debug, Clone, Default)]
pub struct ModelField {
    pub name: String,
    pub type_name: String,
    pub is_public: bool,
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelMethod {
    pub name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub is_public: bool,
    pub annotations: Vec<String>,
    pub parameter_annotations: Vec<Vec<String>>,
    pub parameter_names: Vec<String>,
}

/// One materialized type: the same facts a parsed class file carries,
/// minus method bodies.
#[derive(Debug, Clone, Default)]
pub struct TypeModel {
    pub name: String,
    /// Empty when the type has no supertype.
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub is_public: bool,
    pub annotations: Vec<String>,
    pub fields: Vec<ModelField>,
    pub methods: Vec<ModelMethod>,
}

impl TypeModel {
    fn parent_names(&self) -> impl Iterator<Item = &str> {
        let super_name = (!self.super_name.is_empty()).then_some(self.super_name.as_str());
        super_name.into_iter().chain(self.interfaces.iter().map(String::as_str))
    }
}

/// Registry of type models, keyed by dotted name.
#[derive(Debug, Clone, Default)]
pub struct TypeModelSet {
    types: HashMap<String, Arc<TypeModel>>,
}

impl TypeModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: TypeModel) {
        self.types.insert(model.name.clone(), Arc::new(model));
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeModel>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// The live-model variant of the capability set.
#[derive(Debug, Clone, Default)]
pub struct ModelAdapter {
    types: TypeModelSet,
}

impl ModelAdapter {
    pub fn new(types: TypeModelSet) -> Self {
        Self { types }
    }

    /// Look a type up and require every transitive supertype to be
    /// registered. `java.lang.Object` is treated as intrinsic; cycles in
    /// the declared hierarchy are tolerated rather than re-walked.
    fn resolve(&self, name: &str) -> Result<Arc<TypeModel>, ClassFileError> {
        let root = self
            .types
            .get(name)
            .ok_or_else(|| ClassFileError::UnknownType(name.to_string()))?;

        let mut visited = BTreeSet::new();
        let mut frontier = vec![Arc::clone(&root)];
        while let Some(model) = frontier.pop() {
            if !visited.insert(model.name.clone()) {
                continue;
            }
            for parent in model.parent_names() {
                if parent == "java.lang.Object" || visited.contains(parent) {
                    continue;
                }
                match self.types.get(parent) {
                    Some(next) => frontier.push(next),
                    None => {
                        return Err(ClassFileError::MissingDependency {
                            owner: model.name.clone(),
                            missing: parent.to_string(),
                        })
                    }
                }
            }
        }
        Ok(root)
    }

    fn type_name_of(path: &str) -> String {
        path.strip_suffix(".class").unwrap_or(path).replace('/', ".")
    }
}

impl MetadataAdapter for ModelAdapter {
    type Class = Arc<TypeModel>;
    type Field = ModelField;
    type Method = ModelMethod;

    fn create_descriptor(&self, unit: &ScanUnit) -> Result<Arc<TypeModel>, ClassFileError> {
        self.resolve(&Self::type_name_of(&unit.relative_path))
    }

    fn class_name<'c>(&self, class: &'c Arc<TypeModel>) -> &'c str {
        &class.name
    }

    fn super_name<'c>(&self, class: &'c Arc<TypeModel>) -> &'c str {
        &class.super_name
    }

    fn interface_names<'c>(&self, class: &'c Arc<TypeModel>) -> &'c [String] {
        &class.interfaces
    }

    fn class_annotations<'c>(&self, class: &'c Arc<TypeModel>) -> &'c [String] {
        &class.annotations
    }

    fn is_public_class(&self, class: &Arc<TypeModel>) -> bool {
        class.is_public
    }

    fn fields<'c>(&self, class: &'c Arc<TypeModel>) -> &'c [ModelField] {
        &class.fields
    }

    fn field_name<'c>(&self, field: &'c ModelField) -> &'c str {
        &field.name
    }

    fn field_annotations<'c>(&self, field: &'c ModelField) -> &'c [String] {
        &field.annotations
    }

    fn is_public_field(&self, field: &ModelField) -> bool {
        field.is_public
    }

    fn methods<'c>(&self, class: &'c Arc<TypeModel>) -> &'c [ModelMethod] {
        &class.methods
    }

    fn method_name<'c>(&self, method: &'c ModelMethod) -> &'c str {
        &method.name
    }

    fn parameter_types<'c>(&self, method: &'c ModelMethod) -> &'c [String] {
        &method.parameter_types
    }

    fn return_type<'c>(&self, method: &'c ModelMethod) -> &'c str {
        &method.return_type
    }

    fn method_annotations<'c>(&self, method: &'c ModelMethod) -> &'c [String] {
        &method.annotations
    }

    fn parameter_annotations<'c>(&self, method: &'c ModelMethod, parameter: usize) -> &'c [String] {
        method
            .parameter_annotations
            .get(parameter)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn parameter_names<'c>(&self, method: &'c ModelMethod) -> &'c [String] {
        &method.parameter_names
    }

    fn is_public_method(&self, method: &ModelMethod) -> bool {
        method.is_public
    }
}
