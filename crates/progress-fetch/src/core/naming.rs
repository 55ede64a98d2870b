use std::ffi::OsString;
use std::path::Path;

use uuid::Uuid;

/// Unique file name for a relocated download.
///
/// The name is a fresh UUID v4, followed by the extension of `source` if it
/// has one.
pub fn relocated_file_name(source: &Path) -> OsString {
    let mut name = OsString::from(Uuid::new_v4().to_string());
    if let Some(ext) = source.extension().filter(|ext| !ext.is_empty()) {
        name.push(".");
        name.push(ext);
    }
    name
}
