//! The concrete extraction policies.

use classdex_core::{Index, NameFilter};

use crate::adapter::{MetadataAdapter, ScanUnit};
use crate::classfile::ClassFileError;

use super::{Scanner, ScannerKind};

/// Tag marking a tag-kind as inheritable to subtypes. Its edges are
/// always recorded so inherited-tag queries can tell which tags
/// propagate, even when a result filter would drop it.
pub(crate) const INHERITED_ANNOTATION: &str = "java.lang.annotation.Inherited";

fn accepted(filter: &Option<NameFilter>, name: &str) -> bool {
    filter.as_ref().map_or(true, |f| f.accepts(name))
}

/// Build a default-configured scanner of the given kind.
pub fn scanner_for<A: MetadataAdapter>(kind: ScannerKind) -> Box<dyn Scanner<A>> {
    match kind {
        ScannerKind::SubTypes => Box::new(SubTypesScanner::new()),
        ScannerKind::TypeAnnotations => Box::new(TypeAnnotationsScanner::new()),
        ScannerKind::FieldAnnotations => Box::new(FieldAnnotationsScanner::new()),
        ScannerKind::MethodAnnotations => Box::new(MethodAnnotationsScanner::new()),
        ScannerKind::MethodParameters => Box::new(MethodParametersScanner::new()),
        ScannerKind::MethodParameterNames => Box::new(MethodParameterNamesScanner::new()),
        ScannerKind::MemberUsage => Box::new(MemberUsageScanner::new()),
        ScannerKind::Resources => Box::new(ResourcesScanner::new()),
        ScannerKind::TypeElements => Box::new(TypeElementsScanner::new()),
    }
}

/// Indexes the type hierarchy: `declared supertype -> type` and
/// `declared interface -> type`.
#[derive(Debug, Clone)]
pub struct SubTypesScanner {
    filter: Option<NameFilter>,
}

impl SubTypesScanner {
    /// By default `java.lang.Object` keys are dropped, otherwise the
    /// index would hold every scanned class under one key.
    pub fn new() -> Self {
        let filter = NameFilter::new()
            .exclude(&regex::escape("java.lang.Object"))
            .ok();
        Self { filter }
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl Default for SubTypesScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: MetadataAdapter> Scanner<A> for SubTypesScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::SubTypes
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        let type_name = adapter.class_name(class);

        let super_name = adapter.super_name(class);
        if !super_name.is_empty() && accepted(&self.filter, super_name) {
            index.put(super_name, type_name);
        }
        for interface in adapter.interface_names(class) {
            if accepted(&self.filter, interface) {
                index.put(interface, type_name);
            }
        }
    }
}

/// Indexes type-level tags: `tag -> tagged type`.
#[derive(Debug, Clone, Default)]
pub struct TypeAnnotationsScanner {
    filter: Option<NameFilter>,
}

impl TypeAnnotationsScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A: MetadataAdapter> Scanner<A> for TypeAnnotationsScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::TypeAnnotations
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        let type_name = adapter.class_name(class);
        for annotation in adapter.class_annotations(class) {
            if accepted(&self.filter, annotation) || annotation == INHERITED_ANNOTATION {
                index.put(annotation, type_name);
            }
        }
    }
}

/// Indexes field-level tags: `tag -> owner.field`.
#[derive(Debug, Clone, Default)]
pub struct FieldAnnotationsScanner {
    filter: Option<NameFilter>,
}

impl FieldAnnotationsScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A: MetadataAdapter> Scanner<A> for FieldAnnotationsScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::FieldAnnotations
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        for field in adapter.fields(class) {
            for annotation in adapter.field_annotations(field) {
                if accepted(&self.filter, annotation) {
                    index.put(annotation, &adapter.field_full_key(class, field));
                }
            }
        }
    }
}

/// Indexes callable-level tags: `tag -> owner.name(param types)`.
#[derive(Debug, Clone, Default)]
pub struct MethodAnnotationsScanner {
    filter: Option<NameFilter>,
}

impl MethodAnnotationsScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A: MetadataAdapter> Scanner<A> for MethodAnnotationsScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::MethodAnnotations
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        for method in adapter.methods(class) {
            for annotation in adapter.method_annotations(method) {
                if accepted(&self.filter, annotation) {
                    index.put(annotation, &adapter.method_full_key(class, method));
                }
            }
        }
    }
}

/// Indexes callables by what they take and return: the bracketed
/// parameter type list, the return type, and each parameter tag all map
/// to the callable's full key.
#[derive(Debug, Clone, Default)]
pub struct MethodParametersScanner {
    filter: Option<NameFilter>,
}

impl MethodParametersScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A: MetadataAdapter> Scanner<A> for MethodParametersScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::MethodParameters
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        for method in adapter.methods(class) {
            let full_key = adapter.method_full_key(class, method);

            let signature = format!("[{}]", adapter.parameter_types(method).join(", "));
            if accepted(&self.filter, &signature) {
                index.put(&signature, &full_key);
            }

            let return_type = adapter.return_type(method);
            if accepted(&self.filter, return_type) {
                index.put(return_type, &full_key);
            }

            for parameter in 0..adapter.parameter_types(method).len() {
                for annotation in adapter.parameter_annotations(method, parameter) {
                    if accepted(&self.filter, annotation) {
                        index.put(annotation, &full_key);
                    }
                }
            }
        }
    }
}

/// Indexes declared parameter names: `full key -> "a, b, c"`. Callables
/// compiled without name tables are skipped.
#[derive(Debug, Clone, Default)]
pub struct MethodParameterNamesScanner {
    filter: Option<NameFilter>,
}

impl MethodParameterNamesScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A: MetadataAdapter> Scanner<A> for MethodParameterNamesScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::MethodParameterNames
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        for method in adapter.methods(class) {
            let full_key = adapter.method_full_key(class, method);
            if !accepted(&self.filter, &full_key) {
                continue;
            }
            let names = adapter.parameter_names(method);
            if !names.is_empty() {
                index.put(&full_key, &names.join(", "));
            }
        }
    }
}

/// Indexes body references: `used member -> "using member #line"`. The
/// result filter applies to the used member's key.
#[derive(Debug, Clone, Default)]
pub struct MemberUsageScanner {
    filter: Option<NameFilter>,
}

impl MemberUsageScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A: MetadataAdapter> Scanner<A> for MemberUsageScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::MemberUsage
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        for method in adapter.methods(class) {
            let using = adapter.method_full_key(class, method);
            for usage in adapter.member_usages(method) {
                if !accepted(&self.filter, &usage.target) {
                    continue;
                }
                let value = match usage.line {
                    Some(line) => format!("{using} #{line}"),
                    None => using.clone(),
                };
                index.put(&usage.target, &value);
            }
        }
    }
}

/// Indexes every entry the adapter does not claim: `simple name ->
/// relative path`. Needs no descriptor at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourcesScanner;

impl ResourcesScanner {
    pub fn new() -> Self {
        Self
    }
}

impl<A: MetadataAdapter> Scanner<A> for ResourcesScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::Resources
    }

    fn accepts_input(&self, adapter: &A, path: &str) -> bool {
        !adapter.accepts_input(path)
    }

    fn requires_descriptor(&self) -> bool {
        false
    }

    fn scan_entry(
        &self,
        _adapter: &A,
        unit: &ScanUnit,
        _descriptor: &mut Option<A::Class>,
        index: &Index,
    ) -> Result<(), ClassFileError> {
        index.put(&unit.name, &unit.relative_path);
        Ok(())
    }

    fn scan_type(&self, _adapter: &A, _class: &A::Class, _index: &Index) {}
}

/// Indexes a type's declared surface: `type -> ""` as an existence
/// marker, plus field names, callable keys and `@tag` entries.
#[derive(Debug, Clone)]
pub struct TypeElementsScanner {
    filter: Option<NameFilter>,
    include_fields: bool,
    include_methods: bool,
    include_annotations: bool,
    public_only: bool,
}

impl TypeElementsScanner {
    pub fn new() -> Self {
        Self {
            filter: None,
            include_fields: true,
            include_methods: true,
            include_annotations: true,
            public_only: true,
        }
    }

    pub fn filter_results_by(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn include_fields(mut self, include: bool) -> Self {
        self.include_fields = include;
        self
    }

    pub fn include_methods(mut self, include: bool) -> Self {
        self.include_methods = include;
        self
    }

    pub fn include_annotations(mut self, include: bool) -> Self {
        self.include_annotations = include;
        self
    }

    pub fn public_only(mut self, public_only: bool) -> Self {
        self.public_only = public_only;
        self
    }
}

impl Default for TypeElementsScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: MetadataAdapter> Scanner<A> for TypeElementsScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::TypeElements
    }

    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index) {
        let type_name = adapter.class_name(class);
        if !accepted(&self.filter, type_name) {
            return;
        }
        index.put(type_name, "");

        if self.include_fields {
            for field in adapter.fields(class) {
                index.put(type_name, adapter.field_name(field));
            }
        }
        if self.include_methods {
            for method in adapter.methods(class) {
                if !self.public_only || adapter.is_public_method(method) {
                    index.put(type_name, &adapter.method_key(method));
                }
            }
        }
        if self.include_annotations {
            for annotation in adapter.class_annotations(class) {
                index.put(type_name, &format!("@{annotation}"));
            }
        }
    }
}
