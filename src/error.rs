use thiserror::Error;

/// Fallback shown when a generation failure carries no message of its own.
pub const GENERATION_FALLBACK_MESSAGE: &str = "Failed to generate avatar. Please try again.";

/// Errors surfaced to the user through the `error` field of the app state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Upload was not an image.
    #[error("Please upload a valid image file (JPG, PNG, WebP).")]
    InvalidFileType,
    /// The generation client rejected the request.
    #[error("{0}")]
    GenerationFailed(String),
    /// No API key is configured for the generation client.
    #[error("GEMINI_API_KEY is not configured; cannot reach the image model.")]
    MissingCredential,
    /// History store could not be read or written.
    #[error("history storage error: {0}")]
    Storage(String),
    /// An image payload could not be decoded.
    #[error("could not decode image payload: {0}")]
    Decode(String),
}

impl AppError {
    /// Build a generation failure, substituting the fallback for blank messages.
    pub fn generation(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::GenerationFailed(GENERATION_FALLBACK_MESSAGE.to_owned())
        } else {
            Self::GenerationFailed(message)
        }
    }

    /// Message written into the app state when this error is recovered.
    ///
    /// Missing credentials are reported the same way as any other failed
    /// generation at this layer.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_generation_message_uses_fallback() {
        assert_eq!(
            AppError::generation("   ").user_message(),
            GENERATION_FALLBACK_MESSAGE
        );
    }

    #[test]
    fn generation_message_passes_through() {
        assert_eq!(
            AppError::generation("quota exceeded").user_message(),
            "quota exceeded"
        );
    }

    #[test]
    fn invalid_file_type_has_user_facing_text() {
        assert!(!AppError::InvalidFileType.user_message().is_empty());
    }
}
