//! Virtual container filesystem: one walk-and-read abstraction over
//! plain directory trees, random-access archives and forward-only
//! streamed archives.

mod fs_dir;
mod stream_dir;
mod zip_dir;

pub use fs_dir::FsDir;
pub use stream_dir::TarStreamDir;
pub use zip_dir::ZipDir;

use std::io::Read;
use std::path::Path;

use regex::Regex;
use tracing::warn;

use classdex_core::NameFilter;

use crate::adapter::ScanUnit;
use crate::error::IndexerError;

/// One logical file inside a container.
pub trait VfsFile: Send {
    /// Last path segment.
    fn name(&self) -> &str;
    /// Path relative to the container root, `/`-separated.
    fn relative_path(&self) -> &str;
    /// A fresh read handle on the file's bytes.
    fn open(&self) -> std::io::Result<Box<dyn Read + Send>>;
}

/// One container root: a lazy sequence of files. Held resources are
/// released on drop.
pub trait VfsDir: Send {
    fn path(&self) -> &str;
    fn files(&self) -> Box<dyn Iterator<Item = std::io::Result<Box<dyn VfsFile>>> + Send>;
}

impl std::fmt::Debug for dyn VfsDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsDir").field("path", &self.path()).finish()
    }
}

struct RootHandler {
    name: &'static str,
    matches: fn(&str) -> bool,
    build: fn(&str) -> Result<Box<dyn VfsDir>, IndexerError>,
}

/// Tried in order; the first matching handler opens the root.
static ROOT_HANDLERS: &[RootHandler] = &[
    RootHandler {
        name: "jar-url",
        matches: |locator| locator.starts_with("jar:"),
        build: open_jar_url,
    },
    RootHandler {
        name: "jboss-vfszip",
        matches: |locator| locator.starts_with("vfszip:"),
        build: open_adapted,
    },
    RootHandler {
        name: "jboss-vfsfile",
        matches: |locator| locator.starts_with("vfsfile:"),
        build: open_adapted,
    },
    RootHandler {
        name: "zip-url",
        matches: |locator| locator.starts_with("zip:"),
        build: open_zip_url,
    },
    RootHandler {
        name: "directory",
        matches: |locator| {
            let path = Path::new(plain_path(locator));
            path.is_dir() || !path.exists()
        },
        build: |locator| Ok(Box::new(FsDir::new(plain_path(locator)))),
    },
    RootHandler {
        name: "zip-archive",
        matches: |locator| has_extension(locator, &["zip", "jar"]),
        build: |locator| Ok(Box::new(ZipDir::open(Path::new(plain_path(locator)))?)),
    },
    RootHandler {
        name: "tar-stream",
        matches: |locator| has_extension(locator, &["tar"]),
        build: |locator| Ok(Box::new(TarStreamDir::open(Path::new(plain_path(locator)))?)),
    },
];

/// Open a root locator as a container directory. Handlers are tried in
/// registration order; an unrecognized locator is a configuration error.
pub fn open_root(locator: &str) -> Result<Box<dyn VfsDir>, IndexerError> {
    for handler in ROOT_HANDLERS {
        if (handler.matches)(locator) {
            tracing::debug!(locator, handler = handler.name, "opening scan root");
            return (handler.build)(locator);
        }
    }
    Err(IndexerError::Configuration(format!(
        "unrecognized root locator: {locator}"
    )))
}

/// Strip `file:` URL dressing so the rest can be treated as a path.
fn plain_path(locator: &str) -> &str {
    locator
        .strip_prefix("file://")
        .or_else(|| locator.strip_prefix("file:"))
        .unwrap_or(locator)
}

fn has_extension(locator: &str, extensions: &[&str]) -> bool {
    Path::new(plain_path(locator))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .map_or(false, |e| extensions.contains(&e.as_str()))
}

/// `jar:/path/to/app.jar!/com/x` opens the outer archive.
fn open_jar_url(locator: &str) -> Result<Box<dyn VfsDir>, IndexerError> {
    let rest = locator.strip_prefix("jar:").unwrap_or(locator);
    let outer = rest.split('!').next().unwrap_or(rest);
    Ok(Box::new(ZipDir::open(Path::new(plain_path(outer)))?))
}

/// `zip:zip:/path/app.ear!/lib.jar!/` (the adapted form) opens the
/// outermost archive.
fn open_zip_url(locator: &str) -> Result<Box<dyn VfsDir>, IndexerError> {
    let mut rest = locator;
    while let Some(stripped) = rest.strip_prefix("zip:") {
        rest = stripped;
    }
    let outer = rest.split('!').next().unwrap_or(rest);
    Ok(Box::new(ZipDir::open(Path::new(outer))?))
}

fn open_adapted(locator: &str) -> Result<Box<dyn VfsDir>, IndexerError> {
    let adapted = adapt_url(locator)?;
    open_root(&adapted)
}

const NESTED_ARCHIVE_MARKERS: [&str; 6] = [".ear/", ".jar/", ".war/", ".sar/", ".har/", ".par/"];

/// Rewrite application-server virtual URLs into an openable form.
///
/// `vfsfile:` simply becomes `file:`. For `vfszip:` the path is probed
/// left to right for an archive extension naming a real file; every
/// further nested archive delimiter is replaced with the `!` boundary
/// marker and one `zip:` prefix is added per boundary. Fails when no
/// probe hits a real archive.
pub fn adapt_url(locator: &str) -> Result<String, IndexerError> {
    if let Some(rest) = locator.strip_prefix("vfsfile:") {
        return Ok(format!("file:{rest}"));
    }
    let Some(path) = locator.strip_prefix("vfszip:") else {
        return Ok(locator.to_string());
    };

    let marker = Regex::new(r"\.[ejprw]ar/")
        .map_err(|e| IndexerError::Configuration(e.to_string()))?;

    let mut search_from = 0;
    while let Some(found) = marker.find_at(path, search_from) {
        let boundary = found.end();
        let candidate = &path[..boundary - 1];
        if Path::new(candidate).is_file() {
            return Ok(rewrite_boundaries(path, boundary));
        }
        search_from = boundary;
    }
    Err(IndexerError::ArchiveBoundary(path.to_string()))
}

fn rewrite_boundaries(path: &str, boundary: usize) -> String {
    let archive = &path[..boundary - 1];
    let mut inner = path[boundary..].to_string();
    let mut substitutions = 1;
    for extension in NESTED_ARCHIVE_MARKERS {
        while let Some(at) = inner.find(extension) {
            // ".jar/" -> ".jar!"
            inner.replace_range(at + 4..at + 5, "!");
            substitutions += 1;
        }
    }
    let prefix = "zip:".repeat(substitutions);
    if inner.trim().is_empty() {
        format!("{prefix}{archive}")
    } else {
        format!("{prefix}{archive}!{inner}")
    }
}

/// Collect entries under a relative-path prefix whose file name passes
/// the filter, fully read. Roots that fail to open or iterate are
/// logged and skipped.
pub fn find_files(roots: &[String], prefix: &str, name_filter: &NameFilter) -> Vec<ScanUnit> {
    let mut found = Vec::new();
    for root in roots {
        let dir = match open_root(root) {
            Ok(dir) => dir,
            Err(error) => {
                warn!(%root, %error, "could not open root, continuing");
                continue;
            }
        };
        for file in dir.files() {
            let file = match file {
                Ok(file) => file,
                Err(error) => {
                    warn!(%root, %error, "could not iterate root, continuing");
                    break;
                }
            };
            let path = file.relative_path();
            let Some(rest) = path.strip_prefix(prefix) else {
                continue;
            };
            let name = rest.strip_prefix('/').unwrap_or(rest);
            if name.is_empty() || !name_filter.accepts(name) {
                continue;
            }
            match read_all(file.as_ref()) {
                Ok(data) => found.push(ScanUnit::new(path, data)),
                Err(error) => warn!(path, %error, "could not read entry, continuing"),
            }
        }
    }
    found
}

pub(crate) fn read_all(file: &dyn VfsFile) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    file.open()?.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_unrecognized_locator_is_a_configuration_error() {
        let err = open_root("gopher://archive.weird").unwrap_err();
        assert!(matches!(err, IndexerError::Configuration(_)));
    }

    #[test]
    fn test_missing_directory_opens_empty() {
        let dir = open_root("/definitely/not/here").unwrap();
        assert_eq!(dir.files().count(), 0);
    }

    #[test]
    fn test_adapt_url_passes_unrelated_locators_through() {
        assert_eq!(adapt_url("/plain/dir").unwrap(), "/plain/dir");
        assert_eq!(
            adapt_url("vfsfile:/deploy/conf.xml").unwrap(),
            "file:/deploy/conf.xml"
        );
    }

    #[test]
    fn test_adapt_url_rewrites_nested_archives() {
        let root = tempfile::tempdir().unwrap();
        let ear = root.path().join("app.ear");
        fs::write(&ear, b"stub").unwrap();

        let locator = format!("vfszip:{}/lib/inner.jar/META-INF/", ear.display());
        let adapted = adapt_url(&locator).unwrap();
        assert_eq!(
            adapted,
            format!("zip:zip:{}!lib/inner.jar!META-INF/", ear.display())
        );
    }

    #[test]
    fn test_adapt_url_requires_a_real_archive() {
        let err = adapt_url("vfszip:/nowhere/app.ear/inner.jar/").unwrap_err();
        assert!(matches!(err, IndexerError::ArchiveBoundary(_)));
    }

    #[test]
    fn test_find_files_filters_by_prefix_and_name() {
        let root = tempfile::tempdir().unwrap();
        let sub = root.path().join("com/x");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("app.properties"), b"k=v").unwrap();
        fs::write(root.path().join("top.properties"), b"t=v").unwrap();

        let filter = NameFilter::new().include(r".*\.properties").unwrap();
        let units = find_files(
            &[root.path().display().to_string()],
            "com/x",
            &filter,
        );
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].relative_path, "com/x/app.properties");
        assert_eq!(units[0].data, b"k=v");
    }
}
