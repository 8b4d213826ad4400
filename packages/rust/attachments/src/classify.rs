//! Attachment classification and base-name derivation.

use docweave_shared::FileCategory;

/// Suffixes earlier tooling appends to file stems. At most one is stripped.
pub const PROCESSING_SUFFIXES: [&str; 4] = ["_processed", "_converted", "_parsed", "_split"];

/// Split a file name at its last dot. Leading-dot names have no extension.
fn split_ext(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// If `name` is a converter output such as `report.pdf.md`, return the
/// original file name (`report.pdf`).
pub fn converted_original(name: &str) -> Option<&str> {
    let (inner, ext) = split_ext(name);
    if !ext.is_some_and(|e| e.eq_ignore_ascii_case("md")) {
        return None;
    }
    let (_, inner_ext) = split_ext(inner);
    let category = FileCategory::from_extension(inner_ext?);
    (!category.is_text_like() && category != FileCategory::Other).then_some(inner)
}

/// Classify an attachment by file name, looking through the `.md`
/// conversion marker.
pub fn classify(name: &str) -> FileCategory {
    let name = converted_original(name).unwrap_or(name);
    match split_ext(name) {
        (_, Some(ext)) => FileCategory::from_extension(ext),
        (_, None) => FileCategory::Other,
    }
}

/// `report_processed.pdf.md` → `report`.
pub fn base_name(name: &str) -> String {
    let name = converted_original(name).unwrap_or(name);
    let (stem, _) = split_ext(name);
    PROCESSING_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix).filter(|s| !s.is_empty()))
        .unwrap_or(stem)
        .to_string()
}
