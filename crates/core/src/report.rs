//! Full per-file analysis pipeline and the structured result it produces.
//!
//! A structural failure loading the image aborts the analysis; every
//! enrichment on top of a loaded image (imports, resources, debug record,
//! ...) degrades to "absent" with a recorded warning instead, so one broken
//! directory does not hide the rest of the file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelFlag;
use crate::debuginfo::{self, DebugRecord};
use crate::error::PeResult;
use crate::hash::{self, HashAlgorithm, HashOptions, HashResult};
use crate::pe::exports::{self, ExportTable};
use crate::pe::imports::{self, ImportedModule};
use crate::pe::{Image, ImageSummary};
use crate::resources::icons::{self, IconGroup};
use crate::resources::manifest::{self, ManifestInfo};
use crate::resources::version::{self, VersionInfo};
use crate::resources::{self, ResourceItem, ResourceLimits};
use crate::strings::{self, EnrichedHit, ScanOptions};
use crate::trust::{
    CatalogLocator, SignatureOrchestrator, SignatureVerifyResult, TrustVerifier, VerifyPolicy,
};

/// What the pipeline should compute besides the container structure.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub algorithms: Vec<HashAlgorithm>,
    pub scan_strings: bool,
    pub string_options: ScanOptions,
    pub resource_limits: ResourceLimits,
    /// When set, run signature detection and verification under this policy.
    pub verify_policy: Option<VerifyPolicy>,
}

/// Structured analysis result for one file, consumed by the report/GUI
/// layer. Rendering is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub image: ImageSummary,
    /// `None` means the walk failed, never "no imports".
    pub imports: Option<Vec<ImportedModule>>,
    pub delay_imports: Option<Vec<ImportedModule>>,
    pub exports: Option<ExportTable>,
    pub resources: Option<Vec<ResourceItem>>,
    pub version_info: Option<VersionInfo>,
    pub manifest: Option<ManifestInfo>,
    pub icon_groups: Vec<IconGroup>,
    pub debug_record: Option<DebugRecord>,
    pub strings: Option<Vec<EnrichedHit>>,
    pub strings_truncated: bool,
    pub hashes: HashMap<HashAlgorithm, HashResult>,
    pub signature: Option<SignatureVerifyResult>,
    pub verify_exit_code: Option<i32>,
    /// Mechanism strings for enrichments that failed.
    pub warnings: Vec<String>,
}

/// Run the full pipeline over one file.
pub fn analyze(
    path: &Path,
    options: &AnalyzeOptions,
    verifier: &dyn TrustVerifier,
    locator: &dyn CatalogLocator,
    cancel: &CancelFlag,
) -> PeResult<FileReport> {
    let image = Image::load(path)?;
    let mut warnings = Vec::new();

    let imports = note(&mut warnings, "imports", imports::parse_imports(&image));
    let delay_imports =
        note(&mut warnings, "delay imports", imports::parse_delay_imports(&image));
    let exports = note(&mut warnings, "exports", exports::parse_exports(&image)).flatten();

    let resources =
        note(&mut warnings, "resources", resources::enumerate(&image, &options.resource_limits));
    let (version_info, manifest, icon_groups) = match &resources {
        Some(items) => (
            note(&mut warnings, "version info", version::decode(&image, items)).flatten(),
            note(&mut warnings, "manifest", manifest::decode(&image, items)).flatten(),
            note(&mut warnings, "icon groups", icons::decode(&image, items)).unwrap_or_default(),
        ),
        None => (None, None, Vec::new()),
    };

    let debug_record =
        note(&mut warnings, "debug directory", debuginfo::find_codeview_record(&image)).flatten();

    let (strings, strings_truncated) = if options.scan_strings {
        let outcome = strings::scan(path, &options.string_options, cancel)?;
        let truncated = outcome.truncated;
        (Some(strings::enrich(&image, &outcome.hits)), truncated)
    } else {
        (None, false)
    };

    let hashes = if options.algorithms.is_empty() {
        HashMap::new()
    } else {
        let mut hash_options = HashOptions { cancel: cancel.clone(), ..HashOptions::default() };
        hash::hash_file_multi(path, &options.algorithms, &mut hash_options)?
    };

    let (signature, verify_exit_code) = match options.verify_policy {
        Some(policy) => {
            let orchestrator = SignatureOrchestrator::new(verifier, locator);
            let presence = orchestrator.detect(path, image.has_security_directory());
            let result = orchestrator.verify(path, &presence, policy);
            let code = result.exit_code();
            (Some(result), Some(code))
        }
        None => (None, None),
    };

    Ok(FileReport {
        path: path.display().to_string(),
        image: image.summary(),
        imports,
        delay_imports,
        exports,
        resources,
        version_info,
        manifest,
        icon_groups,
        debug_record,
        strings,
        strings_truncated,
        hashes,
        signature,
        verify_exit_code,
        warnings,
    })
}

/// Convert an enrichment failure into an absent value plus a warning naming
/// the part that failed.
fn note<T>(warnings: &mut Vec<String>, what: &str, result: PeResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warnings.push(format!("{what}: {err}"));
            None
        }
    }
}
