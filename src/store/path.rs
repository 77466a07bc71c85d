use crate::error::{Error, Result};

/// Normalizes a file or folder path to the stored form: no leading or
/// trailing slash, no empty segments.
pub fn normalize_path(path: &str) -> Result<String> {
    let segments: Vec<&str> = path
        .trim()
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(Error::bad_request("Path cannot be empty"));
    }

    for segment in &segments {
        validate_segment(segment)?;
    }

    Ok(segments.join("/"))
}

/// Normalizes a directory prefix used for listings. The root is the empty string.
pub fn normalize_base_path(path: &str) -> Result<String> {
    if path.trim().trim_matches('/').is_empty() {
        return Ok(String::new());
    }
    normalize_path(path)
}

/// True when `path` lies strictly below the directory `dir`.
///
/// The separator is part of the match, so `a/bc/x` is not inside `a/b`.
#[must_use]
pub fn is_descendant(path: &str, dir: &str) -> bool {
    path.len() > dir.len() + 1 && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment == "." || segment == ".." {
        return Err(Error::bad_request(
            "Path cannot contain '.' or '..' segments",
        ));
    }

    if segment.len() > 255 {
        return Err(Error::bad_request(
            "Path segment cannot exceed 255 characters",
        ));
    }

    const INVALID_CHARS: &[char] = &['\0', '\n', '\r', '\\'];
    if segment.chars().any(|c| INVALID_CHARS.contains(&c)) {
        return Err(Error::bad_request(
            "Path segment contains invalid characters",
        ));
    }

    Ok(())
}
