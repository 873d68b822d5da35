use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use jref_cache::RootCacheDir;
use jref_config::{JrefConfig, UsagesLevel};
use jref_usages::source::tree::CompilationUnit;
use jref_usages::{
    codec, Changes, ElementKind, IndexManager, NameKind, NoMirror, Operator, PackageFilter,
    PersistentIndex, TransactionContext, UsageSet, UsageType,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "jref", version, about = "Java usage index (scan roots, query references)")]
struct Cli {
    /// Cache root holding the per-root indexes (defaults to config, then `~/.jref/cache`)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan binary roots (class folders, jars) into their indexes
    Scan(ScanArgs),
    /// Index resolved compilation units (JSON) of a source root
    Sources(SourcesArgs),
    /// Types that reference a class
    Usages(UsagesArgs),
    /// Types declared in a root, matched by simple name
    Types(TypesArgs),
    /// Packages present in a root
    Packages(PackagesArgs),
    /// Delete the cached index of roots
    Clean(CleanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Class folders or archives
    #[arg(required = true)]
    roots: Vec<PathBuf>,
    /// Override the configured analysis level
    #[arg(long, value_enum)]
    usages: Option<LevelArg>,
}

#[derive(Args)]
struct SourcesArgs {
    /// Source root the units belong to
    root: PathBuf,
    /// JSON files, one compilation unit each
    #[arg(required = true)]
    units: Vec<PathBuf>,
    /// Source files (relative to the root) that were deleted
    #[arg(long = "deleted")]
    deleted: Vec<String>,
}

#[derive(Args)]
struct UsagesArgs {
    root: PathBuf,
    /// Dotted binary name of the referenced class
    name: String,
    /// Restrict to these usage kinds (any kind when omitted)
    #[arg(long = "kind", value_enum)]
    kinds: Vec<KindArg>,
    /// Require every requested kind instead of any
    #[arg(long)]
    all_kinds: bool,
    /// Only report users in these packages
    #[arg(long = "package")]
    packages: Vec<String>,
}

#[derive(Args)]
struct TypesArgs {
    root: PathBuf,
    name: String,
    #[arg(long = "match", value_enum, default_value = "prefix")]
    matching: MatchArg,
    #[arg(long = "package")]
    packages: Vec<String>,
}

#[derive(Args)]
struct PackagesArgs {
    root: PathBuf,
    #[arg(long, default_value = "")]
    prefix: String,
    /// Only the next package segment after the prefix
    #[arg(long)]
    direct: bool,
}

#[derive(Args)]
struct CleanArgs {
    #[arg(required = true)]
    roots: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Basic,
    Refs,
    All,
}

impl From<LevelArg> for UsagesLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Basic => UsagesLevel::Basic,
            LevelArg::Refs => UsagesLevel::ExecVarRefs,
            LevelArg::All => UsagesLevel::All,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    SuperClass,
    SuperInterface,
    Field,
    Method,
    Type,
    Functional,
}

impl From<KindArg> for UsageType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::SuperClass => UsageType::SuperClass,
            KindArg::SuperInterface => UsageType::SuperInterface,
            KindArg::Field => UsageType::FieldReference,
            KindArg::Method => UsageType::MethodReference,
            KindArg::Type => UsageType::TypeReference,
            KindArg::Functional => UsageType::FunctionalImplementors,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MatchArg {
    Exact,
    Prefix,
    IgnoreCasePrefix,
    CamelCase,
    IgnoreCaseCamelCase,
    Regex,
    IgnoreCaseRegex,
}

impl From<MatchArg> for NameKind {
    fn from(matching: MatchArg) -> Self {
        match matching {
            MatchArg::Exact => NameKind::Exact,
            MatchArg::Prefix => NameKind::Prefix,
            MatchArg::IgnoreCasePrefix => NameKind::CaseInsensitivePrefix,
            MatchArg::CamelCase => NameKind::CamelCase,
            MatchArg::IgnoreCaseCamelCase => NameKind::CaseInsensitiveCamelCase,
            MatchArg::Regex => NameKind::Regex,
            MatchArg::IgnoreCaseRegex => NameKind::CaseInsensitiveRegex,
        }
    }
}

#[derive(Serialize)]
struct RootReport {
    root: PathBuf,
    up_to_date: bool,
    added: Vec<String>,
    removed: Vec<String>,
    changed: Vec<String>,
}

impl RootReport {
    fn new(root: PathBuf, changes: Changes) -> Self {
        Self {
            root,
            up_to_date: changes.is_up_to_date(),
            added: changes.added,
            removed: changes.removed,
            changed: changes.changed,
        }
    }
}

#[derive(Serialize)]
struct TypeHit {
    name: String,
    kind: ElementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    usages: Vec<&'static str>,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let (mut config, config_path) =
        jref_config::load_for_workspace(&cwd).context("failed to load jref config")?;
    if let Some(cache_dir) = &cli.cache_dir {
        config.index.cache_dir = Some(cache_dir.clone());
    }
    if let Command::Scan(ScanArgs {
        usages: Some(level),
        ..
    }) = &cli.command
    {
        config.index.usages = (*level).into();
        config.index.full_index = false;
    }
    jref_config::init_tracing(&config.logging);
    if let Some(path) = &config_path {
        tracing::debug!(target: "jref.cli", config = %path.display(), "loaded config");
    }

    match cli.command {
        Command::Clean(args) => {
            let cache_root = cache_root(&config)?;
            for root in &args.roots {
                let root = absolute(root)?;
                RootCacheDir::locate(&cache_root, &root)
                    .purge()
                    .with_context(|| format!("failed to purge the index of {}", root.display()))?;
                if !cli.json {
                    println!("cleaned: {}", root.display());
                }
            }
            if cli.json {
                print_json(&serde_json::json!({ "ok": true }))?;
            }
            Ok(0)
        }
        command => {
            let manager = IndexManager::init(&config.index, Arc::new(NoMirror))
                .context("failed to initialise the index manager")?;
            let code = run_indexed(command, &manager, cli.json);
            manager.teardown();
            code
        }
    }
}

fn run_indexed(command: Command, manager: &IndexManager, json: bool) -> Result<i32> {
    match command {
        Command::Scan(args) => {
            let cancel = CancellationToken::new();
            let mut reports = Vec::with_capacity(args.roots.len());
            for root in &args.roots {
                let root = absolute(root)?;
                let changes = manager
                    .scan_binary_root(&root, &cancel)
                    .with_context(|| format!("failed to scan {}", root.display()))?;
                reports.push(RootReport::new(root, changes));
            }
            for root in manager.take_pending_reindex() {
                eprintln!("warning: index of {} is broken, rescan it", root.display());
            }
            if json {
                print_json(&reports)?;
            } else {
                reports.iter().for_each(print_report);
            }
            Ok(0)
        }
        Command::Sources(args) => {
            let root = absolute(&args.root)?;
            let mut units = Vec::with_capacity(args.units.len());
            for path in &args.units {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let unit: CompilationUnit = serde_json::from_str(&text)
                    .with_context(|| format!("invalid compilation unit {}", path.display()))?;
                units.push(unit);
            }

            let mut tx = TransactionContext::begin(manager)?;
            let index = manager.create_usages_query(&root, true, &mut tx)?;
            let mut analyser = index.source_analyser(&mut tx)?;
            for file in &args.deleted {
                analyser.delete(file);
            }
            for unit in &units {
                analyser.analyse(unit);
            }
            let changes = analyser.store()?;
            tx.record_changes(&root, None, &changes)?;
            tx.commit()?;

            let report = RootReport::new(root, changes);
            if json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            Ok(0)
        }
        Command::Usages(args) => {
            let index = open_index(manager, &args.root)?;
            let kinds: UsageSet = args.kinds.iter().copied().map(UsageType::from).collect();
            let operator = if args.all_kinds {
                Operator::And
            } else {
                Operator::Or
            };
            let scope = PackageFilter::for_scope(args.packages);
            let mut hits = index.search(&args.name, kinds, operator, scope.as_ref(), |doc| {
                let record = codec::decode(doc)?;
                let usages = record
                    .data
                    .usage(&args.name)
                    .map(|kinds| kinds.iter().map(usage_name).collect())
                    .unwrap_or_default();
                Some(TypeHit {
                    name: record.name.class_name().to_string(),
                    kind: record.name.kind(),
                    source: record.source,
                    usages,
                })
            })?;
            hits.sort_by(|a, b| a.name.cmp(&b.name));
            print_hits(&hits, json)?;
            Ok(0)
        }
        Command::Types(args) => {
            let index = open_index(manager, &args.root)?;
            let scope = PackageFilter::for_scope(args.packages);
            let mut hits =
                index.get_declared_types(&args.name, args.matching.into(), scope.as_ref(), |doc| {
                    let name = codec::binary_name(doc)?;
                    Some(TypeHit {
                        name: name.class_name().to_string(),
                        kind: name.kind(),
                        source: codec::source_name(doc).map(str::to_string),
                        usages: Vec::new(),
                    })
                })?;
            hits.sort_by(|a, b| a.name.cmp(&b.name));
            print_hits(&hits, json)?;
            Ok(0)
        }
        Command::Packages(args) => {
            let index = open_index(manager, &args.root)?;
            let packages = index.get_package_names(&args.prefix, args.direct)?;
            if json {
                print_json(&packages)?;
            } else {
                for package in &packages {
                    println!("{package}");
                }
            }
            Ok(0)
        }
        Command::Clean(_) => Ok(0),
    }
}

fn cache_root(config: &JrefConfig) -> Result<PathBuf> {
    match &config.index.cache_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(jref_cache::default_cache_root()?),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid root {}", path.display()))
}

fn open_index(manager: &IndexManager, root: &Path) -> Result<Arc<PersistentIndex>> {
    let root = absolute(root)?;
    manager
        .usages_query(&root, true)?
        .with_context(|| format!("no index for {}", root.display()))
}

fn usage_name(kind: UsageType) -> &'static str {
    match kind {
        UsageType::SuperClass => "super-class",
        UsageType::SuperInterface => "super-interface",
        UsageType::FieldReference => "field",
        UsageType::MethodReference => "method",
        UsageType::TypeReference => "type",
        UsageType::FunctionalImplementors => "functional",
    }
}

fn print_report(report: &RootReport) {
    if report.up_to_date {
        println!("{}: up to date", report.root.display());
        return;
    }
    println!("{}:", report.root.display());
    println!("  added: {}", report.added.len());
    println!("  removed: {}", report.removed.len());
    println!("  changed: {}", report.changed.len());
}

fn print_hits(hits: &[TypeHit], json: bool) -> Result<()> {
    if json {
        return print_json(&hits);
    }
    for hit in hits {
        match (&hit.source, hit.usages.is_empty()) {
            (Some(source), true) => println!("{} ({source})", hit.name),
            (Some(source), false) => println!("{} [{}] ({source})", hit.name, hit.usages.join(",")),
            (None, true) => println!("{}", hit.name),
            (None, false) => println!("{} [{}]", hit.name, hit.usages.join(",")),
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
