use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use asmref_config::AsmrefConfig;
use asmref_identity::AssemblyIdentity;
use asmref_metadata::{AssemblyMetadata, EcmaMetadataReader, MetadataReader};
use asmref_pkgconfig::{PackageCache, PackageDescriptor, PersistOutcome};
use asmref_resolve::{
    DependencyWalker, GlobalCacheIndex, Reference, ResolveError, ResolvedReference,
    SearchPathResolver, SearchToken, WalkResult,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "asmref",
    version,
    about = "Resolve .NET assembly references against the GAC, framework directories and pkg-config packages"
)]
struct Cli {
    /// Configuration file (defaults to `ASMREF_CONFIG`, then `./asmref.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one reference (display name or file path) to a file
    Resolve(ResolveArgs),
    /// Inspect pkg-config packages that ship assemblies
    Pkg(PkgArgs),
    /// Inspect the global assembly cache
    Gac(GacArgs),
    /// Print the identity and references stored in an assembly
    Identity(IdentityArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// `Name, Version=.., Culture=.., PublicKeyToken=..` or a path
    reference: String,
    /// Explicit file to try for `{HintPathFromItem}`
    #[arg(long)]
    hint_path: Option<PathBuf>,
    /// Match version and public key token strictly (defaults to true for
    /// strong-named references)
    #[arg(long)]
    specific_version: Option<bool>,
    /// Search path entry; repeat to build an ordered list (overrides config)
    #[arg(long = "search-path")]
    search_path: Vec<String>,
    /// Target framework directory; repeat for several (overrides config)
    #[arg(long = "framework-dir")]
    framework_dir: Vec<PathBuf>,
    /// Also resolve dependencies, related files and satellites
    #[arg(long)]
    deps: bool,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PkgArgs {
    #[command(subcommand)]
    command: PkgCommand,
    /// Emit JSON suitable for CI
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum PkgCommand {
    /// List packages that ship at least one assembly
    List,
    /// Show one package by name (the `.pc` file stem)
    Show { name: String },
    /// Print the file of the package assembly with this full name
    Locate { full_name: String },
}

#[derive(Args)]
struct GacArgs {
    #[command(subcommand)]
    command: GacCommand,
    /// Emit JSON suitable for CI
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum GacCommand {
    /// List installed assemblies, optionally only those with this simple name
    List { name: Option<String> },
}

#[derive(Args)]
struct IdentityArgs {
    /// Assembly file to read
    file: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            if let Some(ResolveError::EnvironmentMissing { tried }) = err.downcast_ref() {
                tracing::error!(target = "asmref.cli", tried = %tried, "global assembly cache not found");
            }
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("failed to determine the current directory")?;
    let (config, config_path) = asmref_config::load(&cwd, cli.config.as_deref())?;
    asmref_config::init_tracing(&config.logging);
    if let Some(path) = &config_path {
        tracing::debug!(target = "asmref.cli", path = %path.display(), "using config file");
    }

    let session = Session::new(config);
    match cli.command {
        Command::Resolve(args) => session.resolve(args),
        Command::Pkg(args) => session.pkg(args),
        Command::Gac(args) => session.gac(args),
        Command::Identity(args) => identity(args),
    }
}

struct Session {
    config: AsmrefConfig,
    reader: Arc<dyn MetadataReader>,
}

#[derive(Serialize)]
struct ResolveReport {
    reference: String,
    resolved: Option<ResolvedReference>,
    trace: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependencies: Option<WalkResult>,
}

#[derive(Serialize)]
struct GacEntry<'a> {
    name: &'a str,
    version: String,
    path: &'a Path,
}

impl Session {
    fn new(config: AsmrefConfig) -> Self {
        Self {
            config,
            reader: Arc::new(EcmaMetadataReader),
        }
    }

    /// Package cache merged from the cache file and refreshed from the
    /// search directories.
    fn package_cache(&self) -> PackageCache {
        let cache = PackageCache::new(Arc::clone(&self.reader))
            .with_cache_file(self.config.pkgconfig.effective_cache_file())
            .with_search_dirs(self.config.pkgconfig.effective_search_dirs());
        report_persist("load", &cache.load());
        let scanned = cache.scan_search_dirs();
        tracing::debug!(target = "asmref.cli", packages = scanned.len(), "scanned package directories");
        cache
    }

    fn gac_index(&self) -> Result<GlobalCacheIndex> {
        let root = self.config.gac.discover_root()?;
        Ok(GlobalCacheIndex::scan(&root))
    }

    fn resolve(&self, args: ResolveArgs) -> Result<i32> {
        let tokens: Vec<SearchToken> = if args.search_path.is_empty() {
            self.config.resolve.search_tokens()
        } else {
            args.search_path.iter().map(|raw| SearchToken::parse(raw)).collect()
        };
        let framework_dirs = if args.framework_dir.is_empty() {
            self.config.resolve.target_framework_dirs.clone()
        } else {
            args.framework_dir.clone()
        };

        let mut resolver = SearchPathResolver::new(Arc::clone(&self.reader))
            .with_search_paths(tokens.clone())
            .with_framework_dirs(framework_dirs)
            .with_assembly_extensions(self.config.resolve.allowed_assembly_extensions.clone());

        // A missing GAC only becomes fatal once resolution reaches `{GAC}`.
        if tokens.contains(&SearchToken::Gac) {
            match self.gac_index() {
                Ok(gac) => resolver = resolver.with_gac(Arc::new(gac)),
                Err(err) => tracing::debug!(
                    target = "asmref.cli",
                    error = %err,
                    "global assembly cache unavailable"
                ),
            }
        }
        let mut packages = None;
        if tokens.contains(&SearchToken::PkgConfig) {
            let cache = Arc::new(self.package_cache());
            resolver = resolver.with_package_cache(Arc::clone(&cache));
            packages = Some(cache);
        }

        let reference = Reference::parse(&args.reference)?
            .with_hint_path(args.hint_path)
            .with_specific_version(args.specific_version);
        let outcome = resolver.resolve(&reference)?;

        let dependencies = match (&outcome.resolved, args.deps) {
            (Some(resolved), true) => {
                let cultures = self.config.resolve.culture_table();
                let walker = DependencyWalker::new(&resolver, &cultures)
                    .with_options(self.config.resolve.walk_options());
                Some(walker.walk(vec![resolved.clone()])?)
            }
            _ => None,
        };

        if let Some(packages) = &packages {
            report_persist("save", &packages.save());
        }

        let report = ResolveReport {
            reference: args.reference,
            resolved: outcome.resolved,
            trace: outcome.trace,
            dependencies,
        };
        let exit = if report.resolved.is_some() { 0 } else { 1 };
        if args.json {
            print_json(&report)?;
        } else {
            print_resolve_report(&report);
        }
        Ok(exit)
    }

    fn pkg(&self, args: PkgArgs) -> Result<i32> {
        let cache = self.package_cache();
        let exit = match args.command {
            PkgCommand::List => {
                let packages = cache.packages();
                if args.json {
                    let list: Vec<&PackageDescriptor> = packages.iter().map(|p| p.as_ref()).collect();
                    print_json(&list)?;
                } else {
                    for package in &packages {
                        println!(
                            "{}\t{}\t{}",
                            package.package_id(),
                            package.version,
                            package.path.display()
                        );
                    }
                }
                0
            }
            PkgCommand::Show { name } => match cache.find_package(&name) {
                Some(package) => {
                    if args.json {
                        print_json(package.as_ref())?;
                    } else {
                        print_package(&package);
                    }
                    0
                }
                None => {
                    eprintln!("package not found: {name}");
                    1
                }
            },
            PkgCommand::Locate { full_name } => match cache.get_assembly_location(&full_name) {
                Some(path) => {
                    if args.json {
                        print_json(&serde_json::json!({ "full_name": full_name, "path": path }))?;
                    } else {
                        println!("{}", path.display());
                    }
                    0
                }
                None => {
                    eprintln!("no package provides: {full_name}");
                    1
                }
            },
        };
        report_persist("save", &cache.save());
        Ok(exit)
    }

    fn gac(&self, args: GacArgs) -> Result<i32> {
        let GacCommand::List { name } = args.command;
        let gac = self.gac_index()?;

        let mut entries = Vec::new();
        for assembly in gac.names() {
            if name.as_deref().is_some_and(|wanted| wanted != assembly) {
                continue;
            }
            if let Some(versions) = gac.versions(assembly) {
                for (version, path) in versions {
                    entries.push(GacEntry {
                        name: assembly,
                        version: version.to_string(),
                        path,
                    });
                }
            }
        }

        if args.json {
            print_json(&entries)?;
        } else {
            for entry in &entries {
                println!("{}\t{}\t{}", entry.name, entry.version, entry.path.display());
            }
        }
        Ok(if name.is_some() && entries.is_empty() { 1 } else { 0 })
    }
}

#[derive(Serialize)]
struct IdentityReport<'a> {
    full_name: String,
    identity: &'a AssemblyIdentity,
    runtime_version: &'a str,
    references: Vec<String>,
}

fn identity(args: IdentityArgs) -> Result<i32> {
    let metadata = AssemblyMetadata::read(&args.file)
        .with_context(|| format!("failed to read assembly {}", args.file.display()))?;
    let report = IdentityReport {
        full_name: metadata.identity.full_name(),
        identity: &metadata.identity,
        runtime_version: &metadata.runtime_version,
        references: metadata.references.iter().map(|r| r.full_name()).collect(),
    };

    if args.json {
        print_json(&report)?;
    } else {
        println!("{}", report.full_name);
        println!("  runtime: {}", report.runtime_version);
        if report.references.is_empty() {
            println!("  references: none");
        } else {
            println!("  references:");
            for reference in &report.references {
                println!("    {reference}");
            }
        }
    }
    Ok(0)
}

fn report_persist(op: &str, outcome: &PersistOutcome) {
    tracing::debug!(target = "asmref.cli", op, outcome = %outcome, "package cache file");
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn print_resolve_report(report: &ResolveReport) {
    let Some(resolved) = &report.resolved else {
        println!("not found: {}", report.reference);
        for line in &report.trace {
            println!("  {line}");
        }
        return;
    };

    print_resolved(resolved, "");
    let Some(walk) = &report.dependencies else {
        return;
    };

    let primary = walk.primary().next();
    if let Some(file) = primary {
        print_attachments(&file.related_files, &file.satellites);
    }
    for file in walk.dependencies() {
        println!();
        print_resolved(&file.reference, "dependency ");
        if let Some(parent) = &file.dependency_of {
            println!("  referenced by: {parent}");
        }
        print_attachments(&file.related_files, &file.satellites);
    }
    for missing in &walk.unresolved {
        println!();
        println!("unresolved: {}", missing.identity);
        println!("  referenced by: {}", missing.referenced_by);
        for line in &missing.trace {
            println!("  {line}");
        }
    }
}

fn print_resolved(resolved: &ResolvedReference, label: &str) {
    println!("{label}{}", resolved.identity);
    println!("  path: {}", resolved.path.display());
    println!("  found via: {}", resolved.found_via);
    println!("  copy local: {}", resolved.copy_local);
    if let Some(package) = &resolved.package {
        println!("  package: {package}");
    }
}

fn print_attachments(related: &[PathBuf], satellites: &[asmref_resolve::SatelliteFile]) {
    for path in related {
        println!("  related: {}", path.display());
    }
    for satellite in satellites {
        println!("  satellite ({}): {}", satellite.culture, satellite.path.display());
    }
}

fn print_package(package: &PackageDescriptor) {
    println!("{} ({})", package.name, package.package_id());
    println!("  file: {}", package.path.display());
    if !package.version.is_empty() {
        println!("  version: {}", package.version);
    }
    if !package.description.is_empty() {
        println!("  description: {}", package.description);
    }
    println!("  gac package: {}", package.is_gac_package);
    if !package.requires.is_empty() {
        println!("  requires: {}", package.requires.join(", "));
    }
    for assembly in &package.assemblies {
        println!("  assembly: {} => {}", assembly.full_name(), assembly.file.display());
    }
}
