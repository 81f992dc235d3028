//! peview-core
//!
//! Core library for inspecting Windows PE/COFF images (EXE, DLL, SYS, OCX)
//! and standalone PDB debug-symbol containers.
//!
//! The crate is a family of parsers over untrusted byte layouts: the PE
//! container (headers, sections, imports, exports), the resource-directory
//! tree with VERSION/MANIFEST/icon-group decoders, embedded CodeView debug
//! records plus the MSF/PDB container, a streaming string scanner, a chunked
//! digest engine, and a thin signature-trust orchestration layer. All
//! substantive logic lives here so it is fully testable and reusable from
//! multiple frontends (CLI, GUI, etc.).
//!
//! Everything is synchronous and single-threaded per call; nothing holds
//! cross-call mutable state, so independent files can be analyzed on
//! separate threads without locking.

pub mod bytes;
pub mod cancel;
pub mod debuginfo;
pub mod error;
pub mod hash;
pub mod pe;
pub mod report;
pub mod resources;
pub mod strings;
pub mod trust;

pub use cancel::CancelFlag;
pub use error::{PeError, PeResult};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
