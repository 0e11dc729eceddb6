//! Plain filesystem tree backend.

use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{VfsDir, VfsFile};

/// A directory tree on the local filesystem. A root that does not exist
/// yields no files rather than an error.
pub struct FsDir {
    root: PathBuf,
    display: String,
}

impl FsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let display = root.display().to_string();
        Self { root, display }
    }
}

impl VfsDir for FsDir {
    fn path(&self) -> &str {
        &self.display
    }

    fn files(&self) -> Box<dyn Iterator<Item = std::io::Result<Box<dyn VfsFile>>> + Send> {
        let pending_dirs = if self.root.is_dir() {
            vec![self.root.clone()]
        } else {
            Vec::new()
        };
        Box::new(FsWalk {
            root: self.root.clone(),
            pending_dirs,
            pending_files: VecDeque::new(),
        })
    }
}

/// Depth-first walk driven by an explicit directory stack, so deep trees
/// cannot overflow the call stack.
struct FsWalk {
    root: PathBuf,
    pending_dirs: Vec<PathBuf>,
    pending_files: VecDeque<PathBuf>,
}

impl Iterator for FsWalk {
    type Item = std::io::Result<Box<dyn VfsFile>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.pending_files.pop_front() {
                return Some(Ok(Box::new(FsFile::new(&self.root, path))));
            }
            let dir = self.pending_dirs.pop()?;
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) => return Some(Err(error)),
            };
            for entry in entries {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if path.is_dir() {
                            self.pending_dirs.push(path);
                        } else {
                            self.pending_files.push_back(path);
                        }
                    }
                    Err(error) => return Some(Err(error)),
                }
            }
        }
    }
}

struct FsFile {
    absolute: PathBuf,
    relative: String,
    name: String,
}

impl FsFile {
    fn new(root: &Path, absolute: PathBuf) -> Self {
        let relative = absolute
            .strip_prefix(root)
            .unwrap_or(&absolute)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let name = relative
            .rsplit('/')
            .next()
            .unwrap_or(relative.as_str())
            .to_string();
        Self {
            absolute,
            relative,
            name,
        }
    }
}

impl VfsFile for FsFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn relative_path(&self) -> &str {
        &self.relative
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(&self.absolute)?))
    }
}
