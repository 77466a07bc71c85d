use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::server::response::ApiError;

const MAX_PROJECT_NAME_LEN: usize = 100;
const MAX_EXTERNAL_ID_LEN: usize = 255;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

pub fn validate_project_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Project name cannot be empty"));
    }
    if name.chars().count() > MAX_PROJECT_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Project name cannot exceed {MAX_PROJECT_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(ApiError::bad_request(
            "Project name can only contain alphanumeric characters, hyphens, underscores, and periods",
        ));
    }
    Ok(())
}

pub fn validate_external_id(external_id: &str) -> Result<(), ApiError> {
    if external_id.trim().is_empty() {
        return Err(ApiError::bad_request("external_id is required"));
    }
    if external_id.len() > MAX_EXTERNAL_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "external_id cannot exceed {MAX_EXTERNAL_ID_LEN} characters"
        )));
    }
    Ok(())
}

/// Fails with 400 naming the first empty field.
pub fn require_fields(fields: &[(&str, &str)]) -> Result<(), ApiError> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(ApiError::bad_request(format!("{name} is required"))),
        None => Ok(()),
    }
}

pub fn decode_base64(field: &str, encoded: &str) -> Result<Bytes, ApiError> {
    STANDARD
        .decode(encoded.trim())
        .map(Bytes::from)
        .map_err(|_| ApiError::bad_request(format!("{field} is not valid base64")))
}
