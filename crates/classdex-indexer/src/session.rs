//! Scan session: configuration, entry discovery and the worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use tracing::{info, warn};

use classdex_core::{Index, NameFilter, Store};

use crate::adapter::{MetadataAdapter, ScanUnit};
use crate::error::IndexerError;
use crate::scanner::{scanner_for, Scanner, ScannerKind};
use crate::vfs;

/// Outcome of one scan pass: the populated store plus every per-entry
/// and per-root error collected along the way.
#[derive(Debug)]
pub struct ScanReport {
    pub store: Store,
    pub errors: Vec<(String, IndexerError)>,
    pub scanned_entries: usize,
    pub elapsed: Duration,
}

/// One configured scan over a set of root locators.
///
/// A session binds an adapter, a scanner set and an optional input
/// filter, then runs either sequentially or over a worker pool. Both
/// modes produce identical index contents; the parallel mode backs the
/// store with concurrent tables so workers can insert without lost
/// updates.
pub struct ScanSession<A: MetadataAdapter> {
    adapter: A,
    roots: Vec<String>,
    scanners: Vec<Box<dyn Scanner<A>>>,
    input_filter: Option<NameFilter>,
    workers: usize,
    fail_fast: bool,
}

impl<A: MetadataAdapter> ScanSession<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            roots: Vec::new(),
            scanners: Vec::new(),
            input_filter: None,
            workers: 1,
            fail_fast: false,
        }
    }

    pub fn add_root(mut self, locator: impl Into<String>) -> Self {
        self.roots.push(locator.into());
        self
    }

    pub fn add_roots<I, S>(mut self, locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots.extend(locators.into_iter().map(Into::into));
        self
    }

    /// Add a scanner. Scanners of the same kind are interchangeable, so
    /// adding a kind twice replaces the earlier configuration.
    pub fn add_scanner(mut self, scanner: Box<dyn Scanner<A>>) -> Self {
        match self
            .scanners
            .iter_mut()
            .find(|existing| existing.kind() == scanner.kind())
        {
            Some(existing) => *existing = scanner,
            None => self.scanners.push(scanner),
        }
        self
    }

    pub fn add_scanner_kinds(mut self, kinds: impl IntoIterator<Item = ScannerKind>) -> Self {
        for kind in kinds {
            self = self.add_scanner(scanner_for(kind));
        }
        self
    }

    /// Restrict which entries are scanned at all. An entry passes when
    /// either its relative path or its dotted form is accepted.
    pub fn filter_inputs(mut self, filter: NameFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    /// Worker count for the scan pass. `1` keeps the scan sequential.
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Use one worker per available CPU.
    pub fn parallel(self) -> Self {
        let count = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        self.workers(count)
    }

    /// Turn the first entry or root failure into a scan-level error
    /// instead of collecting it into the report.
    pub fn fail_fast(mut self, value: bool) -> Self {
        self.fail_fast = value;
        self
    }

    pub fn run(self) -> Result<ScanReport, IndexerError> {
        let started = Instant::now();
        let Self {
            adapter,
            roots,
            mut scanners,
            input_filter,
            workers,
            fail_fast,
        } = self;

        if scanners.is_empty() {
            scanners.push(scanner_for(ScannerKind::SubTypes));
            scanners.push(scanner_for(ScannerKind::TypeAnnotations));
        }

        let parallel = workers > 1;
        let mut store = if parallel {
            Store::concurrent()
        } else {
            Store::new()
        };
        let bound: Vec<(Box<dyn Scanner<A>>, Index)> = scanners
            .into_iter()
            .map(|scanner| {
                let index = store.get_or_create(scanner.kind().index_name());
                (scanner, index)
            })
            .collect();

        let mut errors = Vec::new();
        let scanned = if parallel {
            run_parallel(
                &adapter,
                &bound,
                &roots,
                input_filter.as_ref(),
                workers,
                fail_fast,
                &mut errors,
            )?
        } else {
            run_sequential(
                &adapter,
                &bound,
                &roots,
                input_filter.as_ref(),
                fail_fast,
                &mut errors,
            )?
        };

        let elapsed = started.elapsed();
        info!(
            roots = roots.len(),
            entries = scanned,
            keys = store.key_count(),
            values = store.value_count(),
            errors = errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "scan finished"
        );
        Ok(ScanReport {
            store,
            errors,
            scanned_entries: scanned,
            elapsed,
        })
    }
}

/// Run every accepting scanner over one entry, sharing one descriptor.
/// The descriptor is constructed by the first scanner that needs it; a
/// construction failure aborts the entry, whichever scanner hit it.
fn process_entry<A: MetadataAdapter>(
    adapter: &A,
    bound: &[(Box<dyn Scanner<A>>, Index)],
    unit: &ScanUnit,
) -> Result<(), IndexerError> {
    let path = unit.relative_path.as_str();
    let dotted = unit.dotted_path();
    let mut descriptor: Option<A::Class> = None;
    for (scanner, index) in bound {
        if !scanner.accepts_input(adapter, path) && !scanner.accepts_input(adapter, &dotted) {
            continue;
        }
        scanner
            .scan_entry(adapter, unit, &mut descriptor, index)
            .map_err(|source| IndexerError::Descriptor {
                path: path.to_string(),
                source,
            })?;
    }
    Ok(())
}

fn run_sequential<A: MetadataAdapter>(
    adapter: &A,
    bound: &[(Box<dyn Scanner<A>>, Index)],
    roots: &[String],
    input_filter: Option<&NameFilter>,
    fail_fast: bool,
    errors: &mut Vec<(String, IndexerError)>,
) -> Result<usize, IndexerError> {
    let mut entry_errors = Vec::new();
    let discovery = discover_entries(adapter, bound, roots, input_filter, fail_fast, |unit| {
        if let Err(error) = process_entry(adapter, bound, &unit) {
            if fail_fast {
                return Err(error);
            }
            warn!(path = unit.relative_path.as_str(), %error, "entry failed");
            entry_errors.push((unit.relative_path.clone(), error));
        }
        Ok(())
    });
    let (scanned, root_errors) = discovery?;
    errors.extend(root_errors);
    errors.extend(entry_errors);
    Ok(scanned)
}

fn run_parallel<A: MetadataAdapter>(
    adapter: &A,
    bound: &[(Box<dyn Scanner<A>>, Index)],
    roots: &[String],
    input_filter: Option<&NameFilter>,
    workers: usize,
    fail_fast: bool,
    errors: &mut Vec<(String, IndexerError)>,
) -> Result<usize, IndexerError> {
    let abort = AtomicBool::new(false);
    let (tx, rx) = channel::bounded::<ScanUnit>(workers * 4);

    let (discovery, collected) = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = rx.clone();
            let abort = &abort;
            handles.push(scope.spawn(move || {
                let mut worker_errors = Vec::new();
                for unit in rx {
                    // once aborted, keep draining so discovery never
                    // blocks on a full channel
                    if abort.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(error) = process_entry(adapter, bound, &unit) {
                        warn!(path = unit.relative_path.as_str(), %error, "entry failed");
                        if fail_fast {
                            abort.store(true, Ordering::Relaxed);
                        }
                        worker_errors.push((unit.relative_path.clone(), error));
                    }
                }
                worker_errors
            }));
        }
        drop(rx);

        let discovery = discover_entries(adapter, bound, roots, input_filter, fail_fast, |unit| {
            if abort.load(Ordering::Relaxed) {
                return Err(IndexerError::Configuration("scan aborted".to_string()));
            }
            tx.send(unit)
                .map_err(|_| IndexerError::Configuration("scan workers exited early".to_string()))
        });
        drop(tx);

        let mut collected = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(worker_errors) => collected.extend(worker_errors),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        (discovery, collected)
    });

    if fail_fast {
        // a worker failure is the real cause behind an aborted discovery
        if let Some((_, error)) = collected.into_iter().next() {
            return Err(error);
        }
        let (scanned, _) = discovery?;
        return Ok(scanned);
    }
    errors.extend(collected);
    let (scanned, root_errors) = discovery?;
    errors.extend(root_errors);
    Ok(scanned)
}

/// Walk every root and hand accepted entries to `emit`. Root open and
/// iteration failures abort that root and are collected; sibling roots
/// continue. Entry bytes are read during discovery because streamed
/// containers are single-consumer and cannot be re-read once iteration
/// moves on.
fn discover_entries<A: MetadataAdapter>(
    adapter: &A,
    bound: &[(Box<dyn Scanner<A>>, Index)],
    roots: &[String],
    input_filter: Option<&NameFilter>,
    fail_fast: bool,
    mut emit: impl FnMut(ScanUnit) -> Result<(), IndexerError>,
) -> Result<(usize, Vec<(String, IndexerError)>), IndexerError> {
    let mut errors = Vec::new();
    let mut discovered = 0;
    'roots: for root in roots {
        let dir = match vfs::open_root(root) {
            Ok(dir) => dir,
            Err(error) => {
                if fail_fast {
                    return Err(error);
                }
                warn!(%root, %error, "skipping root");
                errors.push((root.clone(), error));
                continue;
            }
        };
        for file in dir.files() {
            let file = match file {
                Ok(file) => file,
                Err(cause) => {
                    let error = IndexerError::ContainerOpen {
                        path: root.clone(),
                        message: cause.to_string(),
                    };
                    if fail_fast {
                        return Err(error);
                    }
                    warn!(%root, %error, "aborting root");
                    errors.push((root.clone(), error));
                    continue 'roots;
                }
            };

            let path = file.relative_path().to_string();
            let dotted = path.replace('/', ".");
            if let Some(filter) = input_filter {
                if !filter.accepts(&path) && !filter.accepts(&dotted) {
                    continue;
                }
            }

            let mut accepted = false;
            let mut wants_bytes = false;
            for (scanner, _) in bound {
                if scanner.accepts_input(adapter, &path) || scanner.accepts_input(adapter, &dotted)
                {
                    accepted = true;
                    wants_bytes |= scanner.requires_descriptor();
                }
            }
            if !accepted {
                continue;
            }

            let data = if wants_bytes {
                match vfs::read_all(file.as_ref()) {
                    Ok(data) => data,
                    Err(cause) => {
                        let error = IndexerError::Io(cause);
                        if fail_fast {
                            return Err(error);
                        }
                        warn!(path = path.as_str(), %error, "could not read entry");
                        errors.push((path, error));
                        continue;
                    }
                }
            } else {
                Vec::new()
            };

            discovered += 1;
            emit(ScanUnit::new(path, data))?;
        }
    }
    Ok((discovered, errors))
}
