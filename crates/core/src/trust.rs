//! Signature presence detection and verification-source policy.
//!
//! Real cryptographic verification lives behind the [`TrustVerifier`] and
//! [`CatalogLocator`] traits; this module only decides which sources to
//! consult and maps the collaborator's native status codes into the crate's
//! own taxonomy. [`NoopTrustProvider`] keeps non-Windows builds and tests
//! honest by reporting everything as unsigned.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PeResult;

// Native trust status codes the mapper recognizes.
const ERROR_SUCCESS: u32 = 0;
const TRUST_E_NOSIGNATURE: u32 = 0x800B_0100;
const TRUST_E_SUBJECT_NOT_TRUSTED: u32 = 0x800B_0004;
const TRUST_E_BAD_DIGEST: u32 = 0x8009_6010;
const TRUST_E_EXPLICIT_DISTRUST: u32 = 0x800B_0111;
const CERT_E_EXPIRED: u32 = 0x800B_0101;
const CERT_E_REVOKED: u32 = 0x800B_010C;
const CERT_E_UNTRUSTEDROOT: u32 = 0x800B_0109;
const CERT_E_CHAINING: u32 = 0x800B_010A;

/// Final status for one verification source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Valid,
    NotSigned,
    Invalid,
    Error,
}

/// Which sources a verification run consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerifyPolicy {
    /// Verify embedded if present; fall back to catalog only when no
    /// embedded signature exists at all.
    #[default]
    Auto,
    Embedded,
    Catalog,
    Both,
}

/// Hash algorithm to try when probing catalog membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogHashKind {
    Sha256,
    Sha1,
    /// Whatever the catalog-administration provider defaults to.
    ProviderDefault,
}

/// Signer certificate fields as reported by the trust collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub thumbprint: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
    /// Countersignature timestamp, when one is present.
    pub timestamp: Option<String>,
}

/// Raw outcome from the trust collaborator for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeVerdict {
    pub code: u32,
    pub signer: Option<SignerInfo>,
}

/// Presence booleans from the detect phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePresence {
    pub embedded: bool,
    pub catalog: bool,
    pub catalog_path: Option<PathBuf>,
}

impl SignaturePresence {
    pub fn any(&self) -> bool {
        self.embedded || self.catalog
    }
}

/// Mapped result for one consulted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    pub status: SignatureStatus,
    pub native_code: u32,
    pub signer: Option<SignerInfo>,
}

/// Outcome of one Detect → Verify → Map run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureVerifyResult {
    pub policy: VerifyPolicy,
    pub presence: SignaturePresence,
    pub embedded: Option<SourceResult>,
    pub catalog: Option<SourceResult>,
}

impl SignatureVerifyResult {
    /// CLI exit-code reduction: `0` when any requested source verified
    /// Valid, `4` when no signature of any kind is present, `3` otherwise.
    pub fn exit_code(&self) -> i32 {
        let any_valid = [&self.embedded, &self.catalog]
            .into_iter()
            .flatten()
            .any(|s| s.status == SignatureStatus::Valid);
        if any_valid {
            0
        } else if !self.presence.any() {
            4
        } else {
            3
        }
    }
}

/// Collaborator performing the actual cryptographic verification.
pub trait TrustVerifier: Send + Sync {
    fn verify_embedded(&self, path: &Path) -> PeResult<NativeVerdict>;
    fn verify_catalog_member(&self, path: &Path, catalog: &Path) -> PeResult<NativeVerdict>;
}

/// Collaborator that hashes a file for catalog lookup and locates a catalog
/// containing that hash.
pub trait CatalogLocator: Send + Sync {
    fn member_hash(&self, path: &Path, kind: CatalogHashKind) -> PeResult<Option<Vec<u8>>>;
    fn find_catalog(&self, member_hash: &[u8]) -> PeResult<Option<PathBuf>>;
}

/// Trust provider for platforms without an OS trust service: everything is
/// unsigned and no catalogs exist.
#[derive(Debug, Default)]
pub struct NoopTrustProvider;

impl TrustVerifier for NoopTrustProvider {
    fn verify_embedded(&self, _path: &Path) -> PeResult<NativeVerdict> {
        Ok(NativeVerdict { code: TRUST_E_NOSIGNATURE, signer: None })
    }

    fn verify_catalog_member(&self, _path: &Path, _catalog: &Path) -> PeResult<NativeVerdict> {
        Ok(NativeVerdict { code: TRUST_E_NOSIGNATURE, signer: None })
    }
}

impl CatalogLocator for NoopTrustProvider {
    fn member_hash(&self, _path: &Path, _kind: CatalogHashKind) -> PeResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn find_catalog(&self, _member_hash: &[u8]) -> PeResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Map a collaborator's native status code into the crate taxonomy.
pub fn map_native_status(code: u32) -> SignatureStatus {
    match code {
        ERROR_SUCCESS => SignatureStatus::Valid,
        TRUST_E_NOSIGNATURE => SignatureStatus::NotSigned,
        TRUST_E_SUBJECT_NOT_TRUSTED
        | TRUST_E_BAD_DIGEST
        | TRUST_E_EXPLICIT_DISTRUST
        | CERT_E_EXPIRED
        | CERT_E_REVOKED
        | CERT_E_UNTRUSTEDROOT
        | CERT_E_CHAINING => SignatureStatus::Invalid,
        _ => SignatureStatus::Error,
    }
}

/// Detect → Verify → Map state machine over one file.
pub struct SignatureOrchestrator<'a> {
    pub verifier: &'a dyn TrustVerifier,
    pub locator: &'a dyn CatalogLocator,
}

impl<'a> SignatureOrchestrator<'a> {
    pub fn new(verifier: &'a dyn TrustVerifier, locator: &'a dyn CatalogLocator) -> Self {
        Self { verifier, locator }
    }

    /// Detect phase. Embedded presence is the image's security-directory
    /// bit; catalog presence probes SHA-256, then SHA-1, then the provider
    /// default, stopping at the first catalog hit. A locator failure during
    /// probing degrades that source to absent rather than failing detection.
    pub fn detect(&self, path: &Path, has_security_directory: bool) -> SignaturePresence {
        let mut presence = SignaturePresence {
            embedded: has_security_directory,
            ..SignaturePresence::default()
        };
        for kind in
            [CatalogHashKind::Sha256, CatalogHashKind::Sha1, CatalogHashKind::ProviderDefault]
        {
            let hash = match self.locator.member_hash(path, kind) {
                Ok(Some(hash)) => hash,
                Ok(None) | Err(_) => continue,
            };
            if let Ok(Some(catalog)) = self.locator.find_catalog(&hash) {
                presence.catalog = true;
                presence.catalog_path = Some(catalog);
                break;
            }
        }
        presence
    }

    /// Verify phase under the given policy, followed by status mapping.
    ///
    /// A requested source that turns out to be absent yields `NotSigned`
    /// for that source; a collaborator failure yields `Error`.
    pub fn verify(
        &self,
        path: &Path,
        presence: &SignaturePresence,
        policy: VerifyPolicy,
    ) -> SignatureVerifyResult {
        let want_embedded = match policy {
            VerifyPolicy::Embedded | VerifyPolicy::Both => true,
            VerifyPolicy::Auto => presence.embedded,
            VerifyPolicy::Catalog => false,
        };
        let want_catalog = match policy {
            VerifyPolicy::Catalog | VerifyPolicy::Both => true,
            // Auto falls back to catalog only when no embedded signature
            // exists at all.
            VerifyPolicy::Auto => !presence.embedded,
            VerifyPolicy::Embedded => false,
        };

        let embedded = want_embedded.then(|| {
            if !presence.embedded {
                return SourceResult {
                    status: SignatureStatus::NotSigned,
                    native_code: TRUST_E_NOSIGNATURE,
                    signer: None,
                };
            }
            self.run_source(|| self.verifier.verify_embedded(path))
        });

        let catalog = want_catalog.then(|| {
            let catalog_path = match &presence.catalog_path {
                Some(p) if presence.catalog => p.clone(),
                _ => {
                    return SourceResult {
                        status: SignatureStatus::NotSigned,
                        native_code: TRUST_E_NOSIGNATURE,
                        signer: None,
                    }
                }
            };
            self.run_source(|| self.verifier.verify_catalog_member(path, &catalog_path))
        });

        SignatureVerifyResult { policy, presence: presence.clone(), embedded, catalog }
    }

    fn run_source(&self, call: impl FnOnce() -> PeResult<NativeVerdict>) -> SourceResult {
        match call() {
            Ok(verdict) => SourceResult {
                status: map_native_status(verdict.code),
                native_code: verdict.code,
                signer: verdict.signer,
            },
            Err(_) => SourceResult {
                status: SignatureStatus::Error,
                native_code: 0,
                signer: None,
            },
        }
    }
}
