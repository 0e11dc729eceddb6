//! Forward-only streamed archive backend over tar byte streams.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::IndexerError;

use super::{VfsDir, VfsFile};

const BLOCK: u64 = 512;

struct StreamState<R> {
    reader: R,
    /// Payload bytes delivered through entry handles so far.
    logical: u64,
    /// Bytes consumed from the underlying stream so far, headers,
    /// padding and skipped entries included.
    physical: u64,
}

/// A tar archive available only as one sequential byte stream, with no
/// entry table and no seeking.
///
/// All entry handles share a single running cursor. Each regular entry is
/// assigned the half-open window `[start, end)` in cumulative payload
/// position, and its handle delivers bytes only while the shared cursor
/// lies inside that window and the underlying stream is still positioned
/// on the entry's payload. Entries are therefore readable exactly in the
/// order directory iteration discovered them, each consumed fully before
/// the iterator advances. Reads out of that order, or past a window,
/// yield zero bytes rather than an error.
pub struct TarStreamDir<R> {
    display: String,
    state: Arc<Mutex<StreamState<R>>>,
}

impl TarStreamDir<File> {
    pub fn open(path: &Path) -> Result<Self, IndexerError> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| IndexerError::ContainerOpen {
            path: display.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::from_reader(display, file))
    }
}

impl<R: Read + Send + 'static> TarStreamDir<R> {
    pub fn from_reader(display: impl Into<String>, reader: R) -> Self {
        Self {
            display: display.into(),
            state: Arc::new(Mutex::new(StreamState {
                reader,
                logical: 0,
                physical: 0,
            })),
        }
    }
}

impl<R: Read + Send + 'static> VfsDir for TarStreamDir<R> {
    fn path(&self) -> &str {
        &self.display
    }

    fn files(&self) -> Box<dyn Iterator<Item = io::Result<Box<dyn VfsFile>>> + Send> {
        Box::new(TarWalk {
            state: Arc::clone(&self.state),
            next_header_phys: 0,
            logical_end: 0,
            done: false,
        })
    }
}

struct TarWalk<R> {
    state: Arc<Mutex<StreamState<R>>>,
    /// Stream offset of the next header block.
    next_header_phys: u64,
    /// Cumulative payload size of the regular entries yielded so far,
    /// which is the window start of the next one.
    logical_end: u64,
    done: bool,
}

impl<R: Read + Send + 'static> TarWalk<R> {
    fn advance(&mut self) -> io::Result<Option<Box<dyn VfsFile>>> {
        let mut state = self.state.lock();
        loop {
            skip_to(&mut state, self.next_header_phys)?;
            let mut header = [0u8; BLOCK as usize];
            if !read_block(&mut state, &mut header)? {
                return Ok(None);
            }
            if header.iter().all(|&b| b == 0) {
                return Ok(None);
            }

            let size = octal_field(&header[124..136]).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "bad size field in archive entry header",
                )
            })?;
            let name = entry_name(&header);
            let typeflag = header[156];

            let data_phys = self.next_header_phys + BLOCK;
            let padded = (size + BLOCK - 1) / BLOCK * BLOCK;
            self.next_header_phys = data_phys + padded;

            // Hard links, directories, pax and longname records carry no
            // indexable payload. They are skipped physically and take no
            // room in the cumulative window space.
            let regular = (typeflag == b'0' || typeflag == 0) && !name.ends_with('/');
            if !regular || name.is_empty() {
                continue;
            }

            let start = self.logical_end;
            self.logical_end = start + size;
            return Ok(Some(Box::new(TarStreamFile {
                name: short_name(&name),
                relative_path: name,
                start,
                end: start + size,
                phys_start: data_phys,
                state: Arc::clone(&self.state),
            })));
        }
    }
}

impl<R: Read + Send + 'static> Iterator for TarWalk<R> {
    type Item = io::Result<Box<dyn VfsFile>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(file)) => Some(Ok(file)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

struct TarStreamFile<R> {
    name: String,
    relative_path: String,
    start: u64,
    end: u64,
    phys_start: u64,
    state: Arc<Mutex<StreamState<R>>>,
}

impl<R: Read + Send + 'static> VfsFile for TarStreamFile<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(TarEntryReader {
            start: self.start,
            end: self.end,
            phys_start: self.phys_start,
            state: Arc::clone(&self.state),
        }))
    }
}

struct TarEntryReader<R> {
    start: u64,
    end: u64,
    phys_start: u64,
    state: Arc<Mutex<StreamState<R>>>,
}

impl<R: Read + Send> Read for TarEntryReader<R> {
    /// Delivers bytes only while the shared cursor is inside this entry's
    /// window and the stream is still positioned on this entry's payload.
    /// Any other state reads as end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock();
        if state.logical < self.start || state.logical >= self.end {
            return Ok(0);
        }
        if state.physical != self.phys_start + (state.logical - self.start) {
            return Ok(0);
        }
        let take = (self.end - state.logical).min(buf.len() as u64) as usize;
        let read = state.reader.read(&mut buf[..take])?;
        state.logical += read as u64;
        state.physical += read as u64;
        Ok(read)
    }
}

fn skip_to<R: Read>(state: &mut StreamState<R>, target: u64) -> io::Result<()> {
    let mut scratch = [0u8; 4096];
    while state.physical < target {
        let want = (target - state.physical).min(scratch.len() as u64) as usize;
        let read = state.reader.read(&mut scratch[..want])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive stream ended inside an entry",
            ));
        }
        state.physical += read as u64;
    }
    Ok(())
}

/// Reads one full block, or returns false when the stream ends cleanly on
/// the block boundary.
fn read_block<R: Read>(state: &mut StreamState<R>, block: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < block.len() {
        let read = state.reader.read(&mut block[filled..])?;
        if read == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive stream ended inside a header block",
            ));
        }
        filled += read;
        state.physical += read as u64;
    }
    Ok(true)
}

fn octal_field(bytes: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(bytes).ok()?;
    let trimmed = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if trimmed.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(trimmed, 8).ok()
}

fn nul_terminated(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn entry_name(header: &[u8; BLOCK as usize]) -> String {
    let name = String::from_utf8_lossy(nul_terminated(&header[0..100])).into_owned();
    if &header[257..262] == b"ustar" {
        let prefix = String::from_utf8_lossy(nul_terminated(&header[345..500])).into_owned();
        if !prefix.is_empty() {
            return format!("{prefix}/{name}");
        }
    }
    name
}

fn short_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}
