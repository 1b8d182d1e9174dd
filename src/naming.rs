//! Output file naming.
//!
//! Converted files always carry the codec's extension. Two rules exist:
//!
//! - **Keep original name**: reuse the input base name; if it does not already
//!   end in the target extension (case-insensitive), replace its extension.
//! - **Default**: strip the input extension and append the target extension.
//!
//! For any input that is not already named `*.avif`, both rules give the same
//! result: `photo.png` → `photo.avif`.

use std::path::Path;

/// Derive the output file name for `input_name`.
///
/// `extension` is given without the dot, e.g. `"avif"`.
pub fn output_name(input_name: &str, keep_original_name: bool, extension: &str) -> String {
    let base = Path::new(input_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(input_name);

    if keep_original_name && has_extension(base, extension) {
        return base.to_string();
    }
    format!("{}.{}", stem(base), extension)
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// File stem, keeping dotfile names such as `.hidden` intact.
fn stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}
