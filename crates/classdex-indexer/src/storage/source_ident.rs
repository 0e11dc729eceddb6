//! Generated-source identifier encoding.
//!
//! Renders the type-elements index as a nested module tree, so every
//! indexed type, field, method and annotation becomes a lexically valid
//! identifier path that can be referenced as a compile-time-checked
//! symbol instead of a string. Illegal characters are substituted by
//! fixed tokens (`.` -> `_`, `, ` -> `__`, `[]` -> `_arr`), and the
//! resolve functions map a generated path back to the original dotted
//! names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use classdex_core::Store;

use crate::error::IndexerError;
use crate::scanner::ScannerKind;

const PATH_TOKEN: &str = "_";
const PARAM_TOKEN: &str = "__";
const ARRAY_TOKEN: &str = "_arr";

/// Segments that would not parse as module names get a trailing
/// underscore, the same way name collisions do.
const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Writes a store as a generated module tree and resolves generated
/// identifier paths back to the names they encode.
pub struct SourceIdentSerializer;

impl SourceIdentSerializer {
    /// Render the module tree under a root module of the given name.
    /// Depends on the type-elements index being populated.
    pub fn render(store: &Store, root_module: &str) -> Result<String, IndexerError> {
        let mut out = String::new();
        out.push_str(&format!(
            "// generated using classdex SourceIdentSerializer [{}]\n",
            Utc::now().to_rfc3339()
        ));
        out.push_str("#[allow(non_snake_case)]\n");
        out.push_str(&format!("pub mod {} {{\n\n", normalize(root_module)));
        render_tree(store, &mut out);
        out.push_str("}\n");
        Ok(out)
    }

    /// Render and write the module tree to `path`. Returns the written
    /// location.
    pub async fn save(
        store: &Store,
        path: &Path,
        root_module: &str,
    ) -> Result<PathBuf, IndexerError> {
        let rendered = Self::render(store, root_module)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, rendered.as_bytes()).await?;
        info!(path = ?path, "saved generated identifier module");
        Ok(path.to_path_buf())
    }

    /// This encoding is write-only: the module tree drops too much to
    /// rebuild a store from it.
    pub fn read(_bytes: &[u8]) -> Result<Store, IndexerError> {
        Err(IndexerError::Serialization(
            "generated identifier modules cannot be read back into a store".to_string(),
        ))
    }

    /// `Root::com::x::Service` -> `com.x.Service`.
    pub fn resolve_type(path: &str) -> Result<String, IndexerError> {
        let segments = split_path(path);
        if segments.len() < 2 {
            return Err(resolve_error("type", path));
        }
        Ok(segments[1..].join("."))
    }

    /// `Root::com::x::Service::fields::count` -> (`com.x.Service`, `count`).
    pub fn resolve_field(path: &str) -> Result<(String, String), IndexerError> {
        let (owner, leaf) = split_scoped(path, "fields").ok_or_else(|| resolve_error("field", path))?;
        Ok((owner, leaf.to_string()))
    }

    /// `Root::com::x::Service::annotations::com_x_Component` ->
    /// (`com.x.Service`, `com.x.Component`).
    pub fn resolve_annotation(path: &str) -> Result<(String, String), IndexerError> {
        let (owner, leaf) =
            split_scoped(path, "annotations").ok_or_else(|| resolve_error("annotation", path))?;
        Ok((owner, leaf.replace('_', ".")))
    }

    /// `Root::com::x::Service::methods::handle_int__java_lang_String_arr`
    /// -> (`com.x.Service`, `handle`, `[int, java.lang.String[]]`).
    ///
    /// An identifier without parameter tokens decodes to an empty
    /// parameter list: unique method names are emitted bare.
    pub fn resolve_method(path: &str) -> Result<(String, String, Vec<String>), IndexerError> {
        let (owner, leaf) =
            split_scoped(path, "methods").ok_or_else(|| resolve_error("method", path))?;
        match leaf.find(PATH_TOKEN) {
            None => Ok((owner, leaf.to_string(), Vec::new())),
            Some(at) => {
                let name = leaf[..at].to_string();
                let parameters = leaf[at + 1..]
                    .split(PARAM_TOKEN)
                    .filter(|token| !token.is_empty())
                    .map(decode_parameter)
                    .collect();
                Ok((owner, name, parameters))
            }
        }
    }
}

fn render_tree(store: &Store, out: &mut String) {
    let index_name = ScannerKind::TypeElements.index_name();
    let entries: Vec<(String, Vec<String>)> = match store.index(index_name) {
        Ok(index) => index
            .keys()
            .into_iter()
            .map(|key| {
                let values = index.get(&key);
                (key, values)
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    if entries.is_empty() {
        warn!("no type elements indexed, rendering an empty module tree");
    }

    let mut prev: Vec<String> = Vec::new();
    let mut indent = 1usize;
    for (fqn, elements) in entries {
        let paths: Vec<String> = fqn.split('.').map(str::to_string).collect();
        let shared = paths
            .iter()
            .zip(prev.iter())
            .take_while(|(a, b)| a == b)
            .count();

        // close the part of the previous type's scope we are leaving
        for _ in shared..prev.len() {
            indent -= 1;
            push_line(out, indent, "}");
        }
        // open the package levels the previous type did not share
        for j in shared..paths.len() - 1 {
            let name = non_duplicate(&paths[j], &paths, j);
            push_line(out, indent, &format!("pub mod {name} {{"));
            indent += 1;
        }

        let mut annotations = Vec::new();
        let mut fields = Vec::new();
        let mut methods: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for element in &elements {
            if let Some(annotation) = element.strip_prefix('@') {
                annotations.push(annotation.to_string());
            } else if element.contains('(') {
                if !element.starts_with('<') {
                    if let Some((simple, normalized)) = normalize_method(element) {
                        methods.entry(simple).or_default().push(normalized);
                    }
                }
            } else if !element.is_empty() {
                fields.push(element.clone());
            }
        }

        let class_name = non_duplicate(&paths[paths.len() - 1], &paths, paths.len() - 1);
        push_line(out, indent, &format!("pub mod {class_name} {{"));
        indent += 1;

        if !fields.is_empty() {
            push_line(out, indent, "pub mod fields {");
            indent += 1;
            for field in &fields {
                let name = non_duplicate(field, &paths, paths.len());
                push_line(out, indent, &format!("pub mod {name} {{}}"));
            }
            indent -= 1;
            push_line(out, indent, "}");
        }

        if !methods.is_empty() {
            push_line(out, indent, "pub mod methods {");
            indent += 1;
            for (simple, normals) in &methods {
                let unique = normals.len() == 1;
                for normalized in normals {
                    let candidate = if unique { simple } else { normalized };
                    let name = non_duplicate(candidate, &fields, fields.len());
                    let name = non_duplicate(&name, &paths, paths.len());
                    push_line(out, indent, &format!("pub mod {name} {{}}"));
                }
            }
            indent -= 1;
            push_line(out, indent, "}");
        }

        if !annotations.is_empty() {
            push_line(out, indent, "pub mod annotations {");
            indent += 1;
            for annotation in &annotations {
                let name = non_duplicate(annotation, &paths, paths.len());
                push_line(out, indent, &format!("pub mod {name} {{}}"));
            }
            indent -= 1;
            push_line(out, indent, "}");
        }

        prev = paths;
    }

    for j in (1..=prev.len()).rev() {
        push_line(out, j, "}");
    }
}

fn push_line(out: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        out.push('\t');
    }
    out.push_str(line);
    out.push('\n');
}

fn normalize(candidate: &str) -> String {
    let mut name = candidate.replace('.', PATH_TOKEN);
    if RUST_KEYWORDS.contains(&name.as_str()) {
        name.push('_');
    }
    name
}

/// Normalized name, with a trailing underscore appended until it stops
/// colliding with any of the first `offset` entries of `prev`.
fn non_duplicate<S: AsRef<str>>(candidate: &str, prev: &[S], offset: usize) -> String {
    let mut name = normalize(candidate);
    while prev[..offset].iter().any(|p| p.as_ref() == name) {
        name.push('_');
    }
    name
}

/// `handle(int, java.lang.String[])` ->
/// (`handle`, `handle_int__java_lang_String_arr`).
fn normalize_method(element: &str) -> Option<(String, String)> {
    let open = element.find('(')?;
    let close = element.find(')')?;
    let name = &element[..open];
    let parameters = &element[open + 1..close];
    let descriptor = if parameters.is_empty() {
        String::new()
    } else {
        let encoded = parameters
            .replace('.', PATH_TOKEN)
            .replace(", ", PARAM_TOKEN)
            .replace("[]", ARRAY_TOKEN);
        format!("{PATH_TOKEN}{encoded}")
    };
    Some((name.to_string(), format!("{name}{descriptor}")))
}

fn decode_parameter(token: &str) -> String {
    let mut token = token;
    let mut arrays = 0;
    while let Some(stripped) = token.strip_suffix(ARRAY_TOKEN) {
        token = stripped;
        arrays += 1;
    }
    let mut name = token.replace('_', ".");
    for _ in 0..arrays {
        name.push_str("[]");
    }
    name
}

fn split_path(path: &str) -> Vec<&str> {
    path.split("::").filter(|s| !s.is_empty()).collect()
}

/// Splits `Root::a::b::<scope>::leaf` into (`a.b`, `leaf`).
fn split_scoped<'p>(path: &'p str, scope: &str) -> Option<(String, &'p str)> {
    let segments = split_path(path);
    if segments.len() < 4 || segments[segments.len() - 2] != scope {
        return None;
    }
    let owner = segments[1..segments.len() - 2].join(".");
    Some((owner, segments[segments.len() - 1]))
}

fn resolve_error(kind: &str, path: &str) -> IndexerError {
    IndexerError::Serialization(format!("could not resolve to {kind} from {path}"))
}
