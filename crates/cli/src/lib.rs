use anyhow::{anyhow, Result};
use peview_core::hash::HashAlgorithm;

/// Parse a list of user-supplied algorithm names, defaulting to SHA-256
/// when none were given.
pub fn parse_algorithms(names: &[String]) -> Result<Vec<HashAlgorithm>> {
    if names.is_empty() {
        return Ok(vec![HashAlgorithm::Sha256]);
    }
    names
        .iter()
        .map(|name| {
            HashAlgorithm::parse(name)
                .ok_or_else(|| anyhow!("Unknown hash algorithm: {name} (expected md5, sha1, sha256)"))
        })
        .collect()
}

/// Render a byte count with a binary-unit suffix for human-readable output.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
