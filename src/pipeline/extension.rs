//! File-type suffixes derived from urls and responses.
//!
//! Every function returns a lower-cased suffix starting with `.`, or an empty
//! string when nothing can be determined. None of them fail.

use crate::pipeline::model::LinkResponse;

/// Extensions treated as direct image links.
pub const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".gif"];

pub fn from_url(url: &str) -> String {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let name = path
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim_start_matches('.');

    match name.rfind('.') {
        Some(i) if i + 1 < name.len() => name[i..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Subtypes become part of a file name, so only `[a-z0-9.+-]` survive.
fn is_safe_subtype(subtype: &str) -> bool {
    !subtype.is_empty()
        && !subtype.contains("..")
        && subtype
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '+' | '-'))
}

/// `image/jpeg` -> `.jpeg`. Parameters such as `; charset=utf-8` are ignored.
pub fn from_content_type(value: &str) -> String {
    let mime = value.split(';').next().unwrap_or_default().trim();
    match mime.split_once('/') {
        Some((_, subtype)) => {
            let subtype = subtype.trim().to_ascii_lowercase();
            if is_safe_subtype(&subtype) {
                format!(".{subtype}")
            } else {
                String::new()
            }
        }
        None => String::new(),
    }
}

/// The content type wins when present; the final url's suffix is the fallback.
pub fn from_response(response: &LinkResponse) -> String {
    let from_header = response.content_type().map(from_content_type).unwrap_or_default();
    if from_header.is_empty() {
        from_url(response.url().as_str())
    } else {
        from_header
    }
}

/// Returns the lower-cased extension if it is a recognized image extension.
pub fn image_extension(ext: &str) -> &'static str {
    IMAGE_EXTENSIONS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(ext))
        .copied()
        .unwrap_or("")
}

pub fn is_image_extension(ext: &str) -> bool {
    !image_extension(ext).is_empty()
}

/// Image extension of a url, or `""` for anything that is not a recognized image.
pub fn classify_image(url: &str) -> &'static str {
    image_extension(&from_url(url))
}
