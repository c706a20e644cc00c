//! Pre-flight image format classification.
//!
//! The service only accepts lossless source images, so anything with a
//! lossy container suffix is rejected before the upload is attempted.
//! Classification is by suffix alone: a `.webp` file may well be
//! lossless-encoded, but that cannot be told from the name, so the whole
//! suffix is treated as lossy and the server's content inspection remains
//! the authority for anything that slips through.

/// How a filename's suffix maps onto the service's content policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    Lossless,
    Lossy,
    Unsupported,
}

const LOSSLESS_SUFFIXES: &[&str] = &["png", "bmp", "tga", "tiff", "tif", "gif"];
const LOSSY_SUFFIXES: &[&str] = &["jpg", "jpeg", "webp", "avif"];

/// Classify a filename by its lowercase suffix after the last `.`.
pub fn classify(filename: &str) -> FormatClass {
    let suffix = match filename.rsplit_once('.') {
        Some((_, suffix)) if !suffix.is_empty() => suffix.to_ascii_lowercase(),
        _ => return FormatClass::Unsupported,
    };

    if LOSSLESS_SUFFIXES.contains(&suffix.as_str()) {
        FormatClass::Lossless
    } else if LOSSY_SUFFIXES.contains(&suffix.as_str()) {
        FormatClass::Lossy
    } else {
        FormatClass::Unsupported
    }
}

/// Suffix of the lowercase filename, for messages.
pub fn suffix_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, s)| s.to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}
