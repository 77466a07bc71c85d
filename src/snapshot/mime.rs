const BINARY_SNIFF_LEN: usize = 8000;

/// Heuristic used by git: content with a NUL byte near the start is binary.
#[must_use]
pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// Guesses a MIME type from the file extension, falling back to sniffing
/// the content when it is available.
#[must_use]
pub fn detect_mime(path: &str, content: Option<&[u8]>) -> String {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "go" | "rs" | "py" | "rb" | "java" | "c" | "cpp" | "h" | "hpp" | "sh" | "sql" | "toml" => {
            "text/plain; charset=utf-8".to_string()
        }
        "js" => "text/javascript; charset=utf-8".to_string(),
        "ts" => "text/typescript; charset=utf-8".to_string(),
        "md" => "text/markdown; charset=utf-8".to_string(),
        "json" => "application/json".to_string(),
        "yaml" | "yml" => "text/yaml; charset=utf-8".to_string(),
        "xml" => "application/xml".to_string(),
        "html" | "htm" => "text/html; charset=utf-8".to_string(),
        "css" => "text/css; charset=utf-8".to_string(),
        "txt" => "text/plain; charset=utf-8".to_string(),
        "png" => "image/png".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "gif" => "image/gif".to_string(),
        "svg" => "image/svg+xml".to_string(),
        "pdf" => "application/pdf".to_string(),
        _ => match content {
            Some(bytes) if !is_binary(bytes) => "text/plain; charset=utf-8".to_string(),
            _ => "application/octet-stream".to_string(),
        },
    }
}
