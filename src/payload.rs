//! Self-contained image payloads and upload ingestion.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;

/// Image bytes plus declared media type, carried as base64.
///
/// The body is shared, so clones are cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    data: Arc<str>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Arc::from(data_base64.into()),
        }
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, general_purpose::STANDARD.encode(bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn base64(&self) -> &str {
        &self.data
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, AppError> {
        general_purpose::STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| AppError::Decode(e.to_string()))
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn parse_data_uri(uri: &str) -> Result<Self, AppError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| AppError::Decode("missing data: scheme".to_owned()))?;
        let (mime_type, data) = rest
            .split_once(";base64,")
            .ok_or_else(|| AppError::Decode("expected a base64 data URI".to_owned()))?;
        if mime_type.is_empty() {
            return Err(AppError::Decode("missing media type".to_owned()));
        }
        Ok(Self::new(mime_type, data))
    }

    /// File extension used when saving this payload.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("base64_len", &self.data.len())
            .finish()
    }
}

impl Serialize for ImagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_uri())
    }
}

impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        Self::parse_data_uri(&uri).map_err(serde::de::Error::custom)
    }
}

/// Raw file handed over by the picker or a drop.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

/// Reject uploads that cannot become an image payload.
pub fn validate_upload(upload: &FileUpload) -> Result<(), AppError> {
    if !upload.is_image() || upload.bytes.is_empty() {
        return Err(AppError::InvalidFileType);
    }
    Ok(())
}

/// Turn a validated upload into a payload, shrinking oversized rasters.
///
/// CPU-bound; callers run it on a blocking thread.
pub fn decode_upload(upload: FileUpload, max_edge: u32) -> Result<ImagePayload, AppError> {
    validate_upload(&upload)?;
    let media_type = upload.media_type.trim().to_ascii_lowercase();

    // Formats the image crate cannot read (svg, heic) pass through untouched.
    let Ok(img) = image::load_from_memory(&upload.bytes) else {
        return Ok(ImagePayload::from_bytes(media_type, &upload.bytes));
    };

    if img.width().max(img.height()) <= max_edge {
        return Ok(ImagePayload::from_bytes(media_type, &upload.bytes));
    }

    let resized = img.resize(max_edge, max_edge, FilterType::Lanczos3);
    let mut jpeg_bytes = Vec::new();
    image::DynamicImage::ImageRgb8(resized.to_rgb8())
        .write_to(
            &mut Cursor::new(&mut jpeg_bytes),
            image::ImageOutputFormat::Jpeg(85),
        )
        .map_err(|e| AppError::Decode(e.to_string()))?;

    tracing::debug!(
        from_width = img.width(),
        from_height = img.height(),
        to_width = resized.width(),
        to_height = resized.height(),
        "downscaled oversized upload"
    );
    Ok(ImagePayload::from_bytes("image/jpeg", &jpeg_bytes))
}
