//! Image ingestion: the format allow-list every upload passes before any
//! model sees it.

use axum::body::Bytes;
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use thiserror::Error;

/// Subtypes accepted at the upload boundary.
pub const ALLOWED_SUBTYPES: [&str; 3] = ["jpg", "png", "jpeg"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("empty upload")]
    Empty,

    #[error("unsupported image type: {0}")]
    Unsupported(String),

    #[error("file content is not a PNG or JPEG image")]
    Unrecognized,
}

/// An accepted upload. Immutable; a new upload replaces it wholesale.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Bytes,
    subtype: String,
}

impl UploadedImage {
    /// Accepts an upload if its declared type (content type, else file
    /// extension) is on the allow-list and the bytes really are PNG or JPEG.
    pub fn from_upload(
        bytes: Bytes,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<Self, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::Empty);
        }

        let subtype = declared_subtype(content_type, file_name)
            .ok_or_else(|| IngestError::Unsupported("unknown".to_string()))?;
        if !ALLOWED_SUBTYPES.contains(&subtype.as_str()) {
            return Err(IngestError::Unsupported(subtype));
        }

        match image::guess_format(&bytes) {
            Ok(ImageFormat::Png) | Ok(ImageFormat::Jpeg) => {}
            _ => return Err(IngestError::Unrecognized),
        }

        Ok(Self { bytes, subtype })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn mime(&self) -> String {
        format!("image/{}", self.subtype)
    }

    /// `data:image/<subtype>;base64,<payload>`, using the declared subtype.
    pub fn data_uri(&self) -> String {
        format!(
            "data:image/{};base64,{}",
            self.subtype,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

fn declared_subtype(content_type: Option<&str>, file_name: Option<&str>) -> Option<String> {
    let from_mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .and_then(|ct| ct.rsplit('/').next())
        .map(str::to_ascii_lowercase);

    from_mime.or_else(|| {
        file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
    })
}
