use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use peview::{human_size, parse_algorithms};
use peview_core::cancel::CancelFlag;
use peview_core::debuginfo::{self, msf::PdbContainer, MatchVerdict};
use peview_core::hash::{self, HashOptions};
use peview_core::pe::{exports, imports, Image};
use peview_core::report::{self, AnalyzeOptions};
use peview_core::resources::{self, ResourceLimits};
use peview_core::strings::{self, ScanOptions};
use peview_core::trust::{NoopTrustProvider, SignatureOrchestrator, VerifyPolicy};

/// PE/COFF and PDB inspector CLI.
///
/// This CLI is a thin wrapper around `peview-core`; all substantive parsing
/// lives in the library so it can be tested thoroughly and reused from other
/// frontends.
#[derive(Parser, Debug)]
#[command(name = "peview", version, about = "Inspect PE/COFF images and PDB containers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Auto,
    Embedded,
    Catalog,
    Both,
}

impl From<PolicyArg> for VerifyPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Auto => VerifyPolicy::Auto,
            PolicyArg::Embedded => VerifyPolicy::Embedded,
            PolicyArg::Catalog => VerifyPolicy::Catalog,
            PolicyArg::Both => VerifyPolicy::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show header information and the section table.
    Info {
        file: PathBuf,
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List imported modules and functions (including delay imports).
    Imports {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List exported functions, including forwarders.
    Exports {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Enumerate the resource directory tree.
    Resources {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Decode the VERSION resource.
    VersionInfo {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Decode the application manifest resource.
    Manifest {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Decode icon-group resources.
    Icons {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Extract ASCII and UTF-16LE string literals from the raw file.
    Strings {
        file: PathBuf,

        /// Minimum run length, in characters.
        #[arg(long, default_value_t = 4)]
        min_len: usize,

        /// Maximum run length before a hit is flushed and a new run starts.
        #[arg(long, default_value_t = 4096)]
        max_len: usize,

        /// Stop after this many hits per encoding.
        #[arg(long, default_value_t = 100_000)]
        max_hits: usize,

        /// Scan only for ASCII strings.
        #[arg(long, default_value_t = false, conflicts_with = "utf16_only")]
        ascii_only: bool,

        /// Scan only for UTF-16LE strings.
        #[arg(long, default_value_t = false)]
        utf16_only: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Compute file digests.
    Hash {
        file: PathBuf,

        /// Algorithm to compute (md5, sha1, sha256). Repeatable.
        #[arg(long = "algo")]
        algorithms: Vec<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the embedded CodeView debug record and its symbol key.
    DebugInfo {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Inspect a standalone .pdb (MSF) container.
    PdbInfo {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Check whether a PE image and a PDB belong together (GUID + age).
    ///
    /// Exits 0 on a match and 1 on any mismatch, printing the reason.
    Match {
        /// Path to the PE image.
        pe: PathBuf,
        /// Path to the standalone .pdb file.
        pdb: PathBuf,
    },

    /// Detect and verify Authenticode/catalog signatures.
    ///
    /// Exits 0 when a requested source verified valid, 4 when no signature
    /// of any kind is present, and 3 otherwise.
    Verify {
        file: PathBuf,

        /// Which signature sources to verify.
        #[arg(long, value_enum, default_value = "auto")]
        policy: PolicyArg,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run the full analysis pipeline and emit a JSON report.
    Report {
        file: PathBuf,

        /// Include a string scan in the report.
        #[arg(long, default_value_t = false)]
        strings: bool,

        /// Digest algorithms to include. Repeatable; none disables hashing.
        #[arg(long = "algo")]
        algorithms: Vec<String>,

        /// Also run signature verification under this policy.
        #[arg(long, value_enum)]
        verify: Option<PolicyArg>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Info { file, json } => info_command(&file, json)?,
        Command::Imports { file, json } => imports_command(&file, json)?,
        Command::Exports { file, json } => exports_command(&file, json)?,
        Command::Resources { file, json } => resources_command(&file, json)?,
        Command::VersionInfo { file, json } => version_info_command(&file, json)?,
        Command::Manifest { file, json } => manifest_command(&file, json)?,
        Command::Icons { file, json } => icons_command(&file, json)?,
        Command::Strings { file, min_len, max_len, max_hits, ascii_only, utf16_only, json } => {
            strings_command(&file, min_len, max_len, max_hits, ascii_only, utf16_only, json)?
        }
        Command::Hash { file, algorithms, json } => hash_command(&file, &algorithms, json)?,
        Command::DebugInfo { file, json } => debug_info_command(&file, json)?,
        Command::PdbInfo { file, json } => pdb_info_command(&file, json)?,
        Command::Match { pe, pdb } => return match_command(&pe, &pdb),
        Command::Verify { file, policy, json } => return verify_command(&file, policy.into(), json),
        Command::Report { file, strings, algorithms, verify } => {
            report_command(&file, strings, &algorithms, verify)?
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_image(path: &Path) -> Result<Image> {
    Image::load(path).with_context(|| format!("Failed to parse PE image: {}", path.display()))
}

/// Show header information and the section table.
fn info_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let summary = image.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", path.display());
    println!("  Machine:           {} ({:#06x})", summary.machine_name, summary.machine);
    println!("  Bitness:           {}", if summary.is_64bit { "PE32+" } else { "PE32" });
    println!("  Type:              {}", if summary.is_dll { "DLL" } else { "executable" });
    println!("  Entry point:       {:#010x}", summary.entry_point);
    println!("  Image base:        {:#x}", summary.image_base);
    println!("  Section alignment: {:#x}", summary.section_alignment);
    println!("  Subsystem:         {}", summary.subsystem_name);
    println!("  Signed (embedded): {}", if image.has_security_directory() { "yes" } else { "no" });
    println!();
    println!("Sections ({}):", summary.sections.len());
    for section in &summary.sections {
        println!(
            "  {:<8} va={:#010x} vsize={:>10} raw={:#010x} rawsize={:>10} flags={:#010x}",
            section.name,
            section.virtual_address,
            human_size(u64::from(section.virtual_size)),
            section.raw_offset,
            human_size(u64::from(section.raw_size)),
            section.characteristics
        );
    }
    Ok(())
}

/// List imported modules and functions.
fn imports_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let mut modules = imports::parse_imports(&image).context("Failed to walk import table")?;
    modules.extend(
        imports::parse_delay_imports(&image).context("Failed to walk delay-import table")?,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    println!("Imported modules ({}):", modules.len());
    for module in &modules {
        let tag = if module.delayed { " (delay)" } else { "" };
        println!("  {}{}: {} functions", module.name, tag, module.functions.len());
        for func in &module.functions {
            match (&func.name, func.ordinal) {
                (Some(name), _) => println!("    {name}"),
                (None, Some(ordinal)) => println!("    #{ordinal}"),
                (None, None) => {}
            }
        }
    }
    Ok(())
}

/// List exported functions.
fn exports_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let table = exports::parse_exports(&image).context("Failed to parse export directory")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    let table = match table {
        Some(t) => t,
        None => {
            println!("No exports.");
            return Ok(());
        }
    };
    println!(
        "Exports from {} ({} entries, ordinal base {}):",
        table.module_name.as_deref().unwrap_or("<unnamed>"),
        table.functions.len(),
        table.ordinal_base
    );
    for func in &table.functions {
        let name = func.name.as_deref().unwrap_or("<no name>");
        match &func.forwarder {
            Some(target) => println!("  #{:<5} {} -> {}", func.ordinal, name, target),
            None => println!("  #{:<5} {} rva={:#010x}", func.ordinal, name, func.rva),
        }
    }
    Ok(())
}

/// Enumerate the resource tree.
fn resources_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let items = resources::enumerate(&image, &ResourceLimits::default())
        .context("Failed to enumerate resources")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!("Resources ({}):", items.len());
    for item in &items {
        let path_str: Vec<String> = item.path.iter().map(ToString::to_string).collect();
        println!("  {} size={} codepage={}", path_str.join("/"), item.size, item.code_page);
    }
    Ok(())
}

/// Decode the VERSION resource.
fn version_info_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let items = resources::enumerate(&image, &ResourceLimits::default())
        .context("Failed to enumerate resources")?;
    let info = resources::version::decode(&image, &items)
        .context("Failed to decode VERSION resource")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let info = match info {
        Some(i) => i,
        None => {
            println!("No VERSION resource.");
            return Ok(());
        }
    };
    println!("File version:    {}", info.file_version_string());
    println!("Product version: {}", info.product_version_string());
    println!("File flags:      {:#x}", info.file_flags);
    for (key, value) in &info.strings {
        println!("{key}: {value}");
    }
    Ok(())
}

/// Decode the manifest resource.
fn manifest_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let items = resources::enumerate(&image, &ResourceLimits::default())
        .context("Failed to enumerate resources")?;
    let info =
        resources::manifest::decode(&image, &items).context("Failed to decode manifest")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    match info {
        Some(info) => {
            println!("Encoding: {:?}", info.encoding);
            if let Some(level) = &info.requested_execution_level {
                println!("requestedExecutionLevel: {level}");
            }
            if let Some(ui) = &info.ui_access {
                println!("uiAccess: {ui}");
            }
            println!();
            println!("{}", info.text);
        }
        None => println!("No manifest resource."),
    }
    Ok(())
}

/// Decode icon groups.
fn icons_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let items = resources::enumerate(&image, &ResourceLimits::default())
        .context("Failed to enumerate resources")?;
    let groups =
        resources::icons::decode(&image, &items).context("Failed to decode icon groups")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    println!("Icon groups ({}):", groups.len());
    for group in &groups {
        println!("  group {}:", group.group_id.as_deref().unwrap_or("<unnamed>"));
        for entry in &group.entries {
            println!(
                "    {}x{} {}bpp {} (icon #{})",
                entry.width,
                entry.height,
                entry.bit_count,
                human_size(u64::from(entry.bytes_in_res)),
                entry.icon_id
            );
        }
    }
    Ok(())
}

/// Extract strings from the raw file.
fn strings_command(
    path: &Path,
    min_len: usize,
    max_len: usize,
    max_hits: usize,
    ascii_only: bool,
    utf16_only: bool,
    json: bool,
) -> Result<()> {
    let options = ScanOptions {
        min_len,
        max_len,
        max_hits,
        scan_ascii: !utf16_only,
        scan_utf16: !ascii_only,
        ..ScanOptions::default()
    };
    let outcome = strings::scan(path, &options, &CancelFlag::new())
        .with_context(|| format!("Failed to scan {}", path.display()))?;

    // Enrichment is best-effort: the scan works on non-PE files too.
    let enriched = Image::load(path).ok().map(|image| strings::enrich(&image, &outcome.hits));

    if json {
        match &enriched {
            Some(hits) => println!("{}", serde_json::to_string_pretty(hits)?),
            None => println!("{}", serde_json::to_string_pretty(&outcome.hits)?),
        }
        return Ok(());
    }

    for hit in &outcome.hits {
        let encoding = match hit.encoding {
            strings::StringEncoding::Ascii => "a",
            strings::StringEncoding::Utf16Le => "u",
        };
        println!("{:#010x} [{encoding}] {}", hit.offset, hit.text);
    }
    if outcome.truncated {
        eprintln!("(truncated at {max_hits} hits)");
    }
    Ok(())
}

/// Compute file digests.
fn hash_command(path: &Path, algorithms: &[String], json: bool) -> Result<()> {
    let algorithms = parse_algorithms(algorithms)?;
    let mut options = HashOptions::default();
    let results = hash::hash_file_multi(path, &algorithms, &mut options)
        .with_context(|| format!("Failed to hash {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for algorithm in &algorithms {
        if let Some(result) = results.get(algorithm) {
            println!("{:<8} {}", result.algorithm.name(), result.hex_digest);
        }
    }
    Ok(())
}

/// Show the embedded CodeView debug record.
fn debug_info_command(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let record =
        debuginfo::find_codeview_record(&image).context("Failed to read debug directory")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    match record {
        Some(record) => {
            println!("GUID:       {}", record.guid);
            println!("Age:        {}", record.age);
            println!("PDB path:   {}", record.pdb_path);
            println!("Symbol key: {}", record.symbol_key());
            println!("Server path: {}", record.symbol_server_path());
        }
        None => println!("No CodeView debug record."),
    }
    Ok(())
}

/// Inspect a standalone PDB container.
fn pdb_info_command(path: &Path, json: bool) -> Result<()> {
    let pdb = PdbContainer::load(path)
        .with_context(|| format!("Failed to parse PDB container: {}", path.display()))?;
    let info = pdb.info();
    let super_block = pdb.super_block();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Block size: {}", super_block.block_size);
    println!("Blocks:     {}", super_block.num_blocks);
    println!("Streams:    {}", pdb.streams().len());
    println!("Version:    {}", info.version);
    println!("GUID:       {}", info.guid);
    println!("Age:        {}", info.age);
    println!("Symbol key: {}", info.symbol_key());
    Ok(())
}

/// Compare a PE image's RSDS record against a PDB's info stream.
fn match_command(pe_path: &Path, pdb_path: &Path) -> Result<ExitCode> {
    let image = load_image(pe_path)?;
    let record = debuginfo::find_codeview_record(&image)
        .context("Failed to read debug directory")?
        .ok_or_else(|| anyhow!("{} has no CodeView debug record", pe_path.display()))?;
    let pdb = PdbContainer::load(pdb_path)
        .with_context(|| format!("Failed to parse PDB container: {}", pdb_path.display()))?;
    let info = pdb.info();

    let verdict = debuginfo::match_pe_pdb(&record.guid, record.age, &info.guid, info.age);
    match verdict {
        MatchVerdict::Matched => {
            println!("Matched: GUID {} age {}", record.guid, record.age);
            Ok(ExitCode::SUCCESS)
        }
        MatchVerdict::GuidMismatch => {
            println!("GUID mismatch: PE {} vs PDB {}", record.guid, info.guid);
            Ok(ExitCode::from(1))
        }
        MatchVerdict::AgeMismatch => {
            println!("Age mismatch: PE {} vs PDB {} (GUID matches)", record.age, info.age);
            Ok(ExitCode::from(1))
        }
    }
}

/// Detect and verify signatures; the verdict is reduced to the exit code.
fn verify_command(path: &Path, policy: VerifyPolicy, json: bool) -> Result<ExitCode> {
    let image = load_image(path)?;
    let provider = NoopTrustProvider;
    let orchestrator = SignatureOrchestrator::new(&provider, &provider);
    let presence = orchestrator.detect(path, image.has_security_directory());
    let result = orchestrator.verify(path, &presence, policy);
    let code = result.exit_code();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Embedded signature present: {}", presence.embedded);
        println!("Catalog signature present:  {}", presence.catalog);
        if let Some(embedded) = &result.embedded {
            println!("Embedded: {:?}", embedded.status);
        }
        if let Some(catalog) = &result.catalog {
            println!("Catalog:  {:?}", catalog.status);
        }
    }
    // Exit codes: 0 valid, 4 nothing present, 3 otherwise.
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(3)))
}

/// Run the full pipeline and print the JSON report.
fn report_command(
    path: &Path,
    scan_strings: bool,
    algorithms: &[String],
    verify: Option<PolicyArg>,
) -> Result<()> {
    let algorithms = if algorithms.is_empty() { Vec::new() } else { parse_algorithms(algorithms)? };
    let options = AnalyzeOptions {
        algorithms,
        scan_strings,
        verify_policy: verify.map(Into::into),
        ..AnalyzeOptions::default()
    };
    let provider = NoopTrustProvider;
    let report = report::analyze(path, &options, &provider, &provider, &CancelFlag::new())
        .with_context(|| format!("Failed to analyze {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
