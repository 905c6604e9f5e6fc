//! API utility functions
//!
//! Pure, stateless helpers for inbound request checks, kept out of
//! services.rs so they can be unit tested.

use crate::api::error::ApiError;

/// Parses and validates the Content-Type header for multipart/form-data
///
/// Accepts:
/// - `multipart/form-data; boundary=...`
///
/// Rejects:
/// - `multipart/mixed`
/// - `application/x-www-form-urlencoded`
/// - form-data without a boundary
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::MULTIPART || media_type.subtype() != mime::FORM_DATA {
        return Err(ApiError::InvalidPayload(format!(
            "Only accepting form requests, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    if media_type.get_param(mime::BOUNDARY).is_none() {
        return Err(ApiError::InvalidPayload(
            "multipart/form-data without boundary".to_string(),
        ));
    }

    Ok(media_type)
}

/// Reduces a client supplied file name to its last path component
pub fn upload_file_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ApiError::InvalidPayload(format!(
            "invalid upload file name: {:?}",
            raw
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("multipart/form-data; boundary=abc").is_ok());
        assert!(parse_content_type("multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxk").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("multipart/form-data").is_err());
        assert!(parse_content_type("multipart/mixed; boundary=abc").is_err());
        assert!(parse_content_type("application/x-www-form-urlencoded").is_err());
        assert!(parse_content_type("application/json").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_upload_file_name() {
        assert_eq!(upload_file_name("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(upload_file_name("C:\\Users\\me\\clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(upload_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(upload_file_name(" photo one.png ").unwrap(), "photo one.png");
    }

    #[test]
    fn test_upload_file_name_rejects_empty() {
        assert!(upload_file_name("").is_err());
        assert!(upload_file_name("dir/").is_err());
        assert!(upload_file_name("..").is_err());
    }
}
