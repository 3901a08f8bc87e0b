//! Photo-to-avatar stylization service backed by a hosted image model.

pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod generation;
pub mod history;
pub mod logging;
pub mod payload;
pub mod progress;
pub mod server;
pub mod state;
pub mod style;

pub use controller::{spawn, Command, ControllerHandle, ControllerOptions, DownloadTarget};
pub use error::AppError;
pub use generation::{GeminiClient, GenerationClient};
pub use history::{HistoryEntry, HistoryItem, HistoryStore, JsonFileStore, MemoryStore};
pub use payload::{FileUpload, ImagePayload};
pub use state::{AppState, Phase, ProgressView, StateSnapshot};
pub use style::StyleOption;
