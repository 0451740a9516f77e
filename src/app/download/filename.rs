//! Local filename derivation for downloaded files

use std::sync::OnceLock;

use chrono::Local;
use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

/// Basename the download service uses when it has nothing better
const GENERIC_NAME: &str = "download";

fn content_disposition_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).ok())
        .as_ref()
}

/// Strip directories and reject names that would escape the target directory
fn sanitize(name: &str) -> Option<String> {
    let base = name
        .trim()
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => None,
        _ => Some(base.to_string()),
    }
}

/// Filename from a `Content-Disposition` header value
pub fn from_content_disposition(header: &str) -> Option<String> {
    let captured = content_disposition_pattern()?.captures(header)?.get(1)?;
    let decoded = percent_decode_str(captured.as_str()).decode_utf8_lossy();
    sanitize(&decoded)
}

/// Percent-decoded last path segment of a URL
pub fn from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    sanitize(&decoded).filter(|name| name != GENERIC_NAME)
}

/// Resolve the local filename of a download
///
/// Priority: `Content-Disposition` filename, then the URL path basename,
/// then `unknown_file_<entity>_<timestamp>_<hex>.dat`. The random suffix keeps
/// concurrent fallbacks within the same second apart.
pub fn resolve_filename(content_disposition: Option<&str>, url: &str, entity_id: &str) -> String {
    content_disposition
        .and_then(from_content_disposition)
        .or_else(|| from_url(url))
        .unwrap_or_else(|| {
            format!(
                "unknown_file_{}_{}_{:08x}.dat",
                entity_id,
                Local::now().format("%Y%m%d_%H%M%S"),
                fastrand::u32(..)
            )
        })
}
