//! Classdex CLI
//!
//! Command-line interface for scanning class containers and querying
//! saved index snapshots.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use classdex_core::{ClassdexConfig, NameFilter};
use classdex_indexer::{
    Classdex, ClassFileAdapter, ScanSession, ScannerKind, SnapshotFormat, SourceIdentSerializer,
    Storage,
};

#[derive(Parser)]
#[command(name = "classdex")]
#[command(about = "Classdex - structural indexing for JVM class containers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan roots and save the resulting index
    Scan {
        /// Root locators: directories, zip/jar archives, tar streams, URLs
        #[arg(required = true)]
        roots: Vec<String>,

        /// Scanner kind, repeatable (default: from config)
        #[arg(short, long = "scanner")]
        scanners: Vec<String>,

        /// Include pattern (full-name regex), repeatable
        #[arg(long)]
        include: Vec<String>,

        /// Exclude pattern (full-name regex), repeatable
        #[arg(long)]
        exclude: Vec<String>,

        /// Worker threads (0 = sequential)
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Snapshot format: json or msgpack
        #[arg(short, long)]
        format: Option<String>,

        /// Output file; its extension selects the encoding
        /// (default: hashed location under the storage directory)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Abort on the first entry failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Query a saved index snapshot
    Query {
        /// Saved snapshot path
        index: PathBuf,

        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Render the TypeElements index as a Rust module tree
    ExportModule {
        /// Saved snapshot path
        index: PathBuf,

        /// Root module name
        #[arg(long, default_value = "Model")]
        root: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Merge saved snapshots into one
    Merge {
        /// Input snapshot paths
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Merged output file
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Transitive subtypes of a type
    Subtypes { type_name: String },

    /// Types tagged with an annotation
    Tagged {
        annotation: String,

        /// Honor the @Inherited marker
        #[arg(long)]
        inherited: bool,
    },

    /// Fields tagged with an annotation
    FieldsTagged { annotation: String },

    /// Methods tagged with an annotation
    MethodsTagged { annotation: String },

    /// Resources whose simple name matches a regex
    Resources { pattern: String },

    /// Declared parameter names of a full method key
    ParamNames { method: String },

    /// Recorded usages of a member key
    Usages { member: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            roots,
            scanners,
            include,
            exclude,
            parallel,
            format,
            out,
            fail_fast,
        } => {
            cmd_scan(
                roots, scanners, include, exclude, parallel, format, out, fail_fast,
            )
            .await
        }
        Commands::Query { index, query } => cmd_query(&index, query).await,
        Commands::ExportModule { index, root, out } => cmd_export_module(&index, &root, out).await,
        Commands::Merge { inputs, out } => cmd_merge(&inputs, &out).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_scan(
    roots: Vec<String>,
    scanners: Vec<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    parallel: Option<usize>,
    format: Option<String>,
    out: Option<PathBuf>,
    fail_fast: bool,
) -> Result<()> {
    let config = ClassdexConfig::load();

    let kind_names = if scanners.is_empty() {
        config.default_scanners.clone()
    } else {
        scanners
    };
    let mut kinds = Vec::with_capacity(kind_names.len());
    for name in &kind_names {
        kinds.push(name.parse::<ScannerKind>()?);
    }

    let mut filter = NameFilter::new();
    for pattern in config.include.iter().chain(include.iter()) {
        filter = filter
            .include(pattern)
            .with_context(|| format!("bad include pattern: {pattern}"))?;
    }
    for pattern in config.exclude.iter().chain(exclude.iter()) {
        filter = filter
            .exclude(pattern)
            .with_context(|| format!("bad exclude pattern: {pattern}"))?;
    }

    let workers = parallel.unwrap_or(config.parallel_workers);
    let mut session = ScanSession::new(ClassFileAdapter::new())
        .add_roots(roots.clone())
        .add_scanner_kinds(kinds)
        .workers(workers.max(1))
        .fail_fast(fail_fast);
    if !filter.is_empty() {
        session = session.filter_inputs(filter);
    }

    let report = tokio::task::spawn_blocking(move || session.run())
        .await
        .context("scan task failed")??;

    println!(
        "Scanned {} entries in {:.2}s ({} keys, {} values)",
        report.scanned_entries,
        report.elapsed.as_secs_f64(),
        report.store.key_count(),
        report.store.value_count(),
    );
    if !report.errors.is_empty() {
        println!("{} entries failed:", report.errors.len());
        for (path, error) in &report.errors {
            println!("  {path}: {error}");
        }
    }

    let dex = Classdex::from_report(report);
    let written = match out {
        Some(path) => dex.save(&path).await?,
        None => {
            let format_name = format.unwrap_or_else(|| config.format.clone());
            let format: SnapshotFormat = format_name.parse()?;
            let storage = Storage::new(&config.storage_dir).with_format(format);
            storage
                .save(dex.store(), &Storage::snapshot_hash(&roots))
                .await?
        }
    };
    println!("Index saved to {}", written.display());

    Ok(())
}

async fn cmd_query(index: &PathBuf, query: QueryCommand) -> Result<()> {
    let dex = Classdex::load(index)
        .await
        .with_context(|| format!("could not load index {}", index.display()))?;

    let results = match query {
        QueryCommand::Subtypes { type_name } => dex.subtypes_of(&type_name)?,
        QueryCommand::Tagged {
            annotation,
            inherited,
        } => dex.types_tagged_with(&annotation, inherited)?,
        QueryCommand::FieldsTagged { annotation } => dex.fields_tagged_with(&annotation)?,
        QueryCommand::MethodsTagged { annotation } => dex.methods_tagged_with(&annotation)?,
        QueryCommand::Resources { pattern } => dex.resources(&pattern)?,
        QueryCommand::ParamNames { method } => dex.method_param_names(&method)?,
        QueryCommand::Usages { member } => dex.usages_of(&member)?,
    };

    if results.is_empty() {
        println!("(no results)");
    }
    for result in results {
        println!("{result}");
    }

    Ok(())
}

async fn cmd_export_module(index: &PathBuf, root: &str, out: Option<PathBuf>) -> Result<()> {
    let dex = Classdex::load(index)
        .await
        .with_context(|| format!("could not load index {}", index.display()))?;

    match out {
        Some(path) => {
            let written = SourceIdentSerializer::save(dex.store(), &path, root).await?;
            println!("Module tree saved to {}", written.display());
        }
        None => print!("{}", SourceIdentSerializer::render(dex.store(), root)?),
    }

    Ok(())
}

async fn cmd_merge(inputs: &[PathBuf], out: &PathBuf) -> Result<()> {
    let mut merged: Option<Classdex> = None;
    for input in inputs {
        let dex = Classdex::load(input)
            .await
            .with_context(|| format!("could not load index {}", input.display()))?;
        match merged.as_mut() {
            Some(base) => base.merge(&dex),
            None => merged = Some(dex),
        }
    }

    let merged = merged.context("no inputs to merge")?;
    let written = merged.save(out).await?;
    println!(
        "Merged {} snapshots into {}",
        inputs.len(),
        written.display()
    );

    Ok(())
}
