use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::payload::ImagePayload;

/// A payload ready to be saved by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

pub fn filename_for(payload: &ImagePayload, now: DateTime<Utc>) -> String {
    format!("avatar-{}.{}", now.timestamp_millis(), payload.extension())
}

pub fn prepare(payload: &ImagePayload, now: DateTime<Utc>) -> Result<Download, AppError> {
    Ok(Download {
        filename: filename_for(payload, now),
        mime_type: payload.mime_type().to_owned(),
        bytes: payload.decode_bytes()?,
    })
}
