//! Random-access archive backend over zip/jar files.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::IndexerError;

use super::{VfsDir, VfsFile};

/// A zip or jar archive. The entry table is listed once at open time;
/// every file open re-reads its entry independently, so entries can be
/// read in any order and from multiple workers.
#[derive(Debug)]
pub struct ZipDir {
    archive_path: PathBuf,
    display: String,
    entries: Vec<String>,
}

impl ZipDir {
    pub fn open(path: &Path) -> Result<Self, IndexerError> {
        let display = path.display().to_string();
        let open_error = |message: String| IndexerError::ContainerOpen {
            path: display.clone(),
            message,
        };

        let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
        let mut archive = ZipArchive::new(file).map_err(|e| open_error(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index).map_err(|e| open_error(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            entries.push(entry.name().to_string());
        }

        Ok(Self {
            archive_path: path.to_path_buf(),
            display,
            entries,
        })
    }
}

impl VfsDir for ZipDir {
    fn path(&self) -> &str {
        &self.display
    }

    fn files(&self) -> Box<dyn Iterator<Item = io::Result<Box<dyn VfsFile>>> + Send> {
        let archive_path = self.archive_path.clone();
        Box::new(self.entries.clone().into_iter().map(move |entry| {
            Ok(Box::new(ZipEntryFile::new(archive_path.clone(), entry)) as Box<dyn VfsFile>)
        }))
    }
}

struct ZipEntryFile {
    archive_path: PathBuf,
    entry: String,
    name: String,
}

impl ZipEntryFile {
    fn new(archive_path: PathBuf, entry: String) -> Self {
        let name = entry
            .rsplit('/')
            .next()
            .unwrap_or(entry.as_str())
            .to_string();
        Self {
            archive_path,
            entry,
            name,
        }
    }
}

impl VfsFile for ZipEntryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn relative_path(&self) -> &str {
        &self.entry
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(&self.archive_path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let mut entry = archive
            .by_name(&self.entry)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(Box::new(Cursor::new(data)))
    }
}
