//! Guards against overwriting inputs when building a catalog.
//!
//! `trackmatch index` deletes an existing output file before writing, so the
//! output path is checked first.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions of files `trackmatch` reads as input and must never replace.
const PROTECTED_EXTENSIONS: [&str; 2] = ["json", "jsonl"];

/// Validates that `output` is safe to delete and recreate:
/// - its file name contains `required_pattern` (e.g. "catalog")
/// - it is not one of `source_paths`
/// - it does not look like an input file
pub fn validate_output_path(output: &Path, required_pattern: &str, source_paths: &[&Path]) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        let same = output == *source
            || matches!(
                (output.canonicalize(), source.canonicalize()),
                (Ok(a), Ok(b)) if a == b
            );
        if same {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if let Some(ext) = extension {
        if PROTECTED_EXTENSIONS.contains(&ext.as_str()) {
            bail!(
                "Safety check failed: output '{}' looks like an input file (.{})",
                output.display(),
                ext
            );
        }
    }

    Ok(())
}
