//! Scanner framework: one scanner kind, one extraction policy, one index.

mod scanners;

pub use scanners::{
    scanner_for, FieldAnnotationsScanner, MemberUsageScanner, MethodAnnotationsScanner,
    MethodParameterNamesScanner, MethodParametersScanner, ResourcesScanner, SubTypesScanner,
    TypeAnnotationsScanner, TypeElementsScanner,
};
pub(crate) use scanners::INHERITED_ANNOTATION;

use std::fmt;
use std::str::FromStr;

use classdex_core::Index;

use crate::adapter::{MetadataAdapter, ScanUnit};
use crate::classfile::ClassFileError;
use crate::error::IndexerError;

/// Identity of a scanner. Two configured scanners of the same kind are
/// interchangeable as far as a scan session is concerned, and the kind
/// names the store index the scanner writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScannerKind {
    SubTypes,
    TypeAnnotations,
    FieldAnnotations,
    MethodAnnotations,
    MethodParameters,
    MethodParameterNames,
    MemberUsage,
    Resources,
    TypeElements,
}

impl ScannerKind {
    pub const ALL: [ScannerKind; 9] = [
        ScannerKind::SubTypes,
        ScannerKind::TypeAnnotations,
        ScannerKind::FieldAnnotations,
        ScannerKind::MethodAnnotations,
        ScannerKind::MethodParameters,
        ScannerKind::MethodParameterNames,
        ScannerKind::MemberUsage,
        ScannerKind::Resources,
        ScannerKind::TypeElements,
    ];

    /// Name of the store index this scanner kind writes.
    pub fn index_name(&self) -> &'static str {
        match self {
            ScannerKind::SubTypes => "SubTypes",
            ScannerKind::TypeAnnotations => "TypeAnnotations",
            ScannerKind::FieldAnnotations => "FieldAnnotations",
            ScannerKind::MethodAnnotations => "MethodAnnotations",
            ScannerKind::MethodParameters => "MethodParameters",
            ScannerKind::MethodParameterNames => "MethodParameterNames",
            ScannerKind::MemberUsage => "MemberUsage",
            ScannerKind::Resources => "Resources",
            ScannerKind::TypeElements => "TypeElements",
        }
    }
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index_name())
    }
}

impl FromStr for ScannerKind {
    type Err = IndexerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ScannerKind::ALL
            .into_iter()
            .find(|kind| kind.index_name() == name)
            .ok_or_else(|| IndexerError::Configuration(format!("unknown scanner: {name}")))
    }
}

/// One extraction policy over descriptors produced by an adapter.
///
/// A scanner claims entries via [`Scanner::accepts_input`], then extracts
/// facts from the shared per-entry descriptor into its own index. The
/// descriptor is constructed at most once per entry per pass, by the
/// first scanner that needs it, and reused by the rest.
pub trait Scanner<A: MetadataAdapter>: Send + Sync {
    fn kind(&self) -> ScannerKind;

    /// Whether this scanner wants the entry at `path`. Delegates to the
    /// adapter unless the scanner claims non-type resources instead.
    fn accepts_input(&self, adapter: &A, path: &str) -> bool {
        adapter.accepts_input(path)
    }

    /// Whether the entry's bytes must be read and a descriptor built
    /// before [`Scanner::scan_entry`] runs.
    fn requires_descriptor(&self) -> bool {
        true
    }

    /// Scan one entry, constructing the shared descriptor on first use.
    fn scan_entry(
        &self,
        adapter: &A,
        unit: &ScanUnit,
        descriptor: &mut Option<A::Class>,
        index: &Index,
    ) -> Result<(), ClassFileError> {
        if descriptor.is_none() {
            *descriptor = Some(adapter.create_descriptor(unit)?);
        }
        if let Some(class) = descriptor.as_ref() {
            self.scan_type(adapter, class, index);
        }
        Ok(())
    }

    /// The scanner's extraction logic over one type descriptor.
    fn scan_type(&self, adapter: &A, class: &A::Class, index: &Index);
}
