//! Application state and its pure transition function.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::history::{self, HistoryEntry, HistoryItem};
use crate::payload::ImagePayload;
use crate::progress;
use crate::style::StyleOption;

/// Generation lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Generating,
    Succeeded,
    Failed,
}

/// The request currently in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: u64,
    pub source: ImagePayload,
    pub style: StyleOption,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub original_image: Option<ImagePayload>,
    pub generated_avatar: Option<ImagePayload>,
    pub is_generating: bool,
    pub selected_style: StyleOption,
    pub error: Option<String>,
    pub history: Vec<HistoryItem>,

    pub phase: Phase,
    pub pending: Option<PendingRequest>,
    pub is_dragging: bool,
    pub is_ingesting: bool,
    /// Percent shown on the progress bar.
    pub progress: f64,
    pub progress_step: usize,
    /// Clear-all has been requested and awaits confirmation.
    pub confirm_clear: bool,
    next_request_id: u64,
}

impl AppState {
    pub fn with_history(history: Vec<HistoryItem>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn can_generate(&self) -> bool {
        self.original_image.is_some() && !self.is_generating
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.phase,
            original_image: self.original_image.clone(),
            generated_avatar: self.generated_avatar.clone(),
            is_generating: self.is_generating,
            selected_style: self.selected_style,
            error: self.error.clone(),
            history: history::entries(&self.history),
            is_dragging: self.is_dragging,
            is_ingesting: self.is_ingesting,
            progress: self.progress,
            progress_step: self.progress_step,
            progress_message: progress::message_for(self.progress_step),
            confirm_clear: self.confirm_clear,
        }
    }

    pub fn progress_view(&self) -> ProgressView {
        ProgressView {
            phase: self.phase,
            is_generating: self.is_generating,
            is_ingesting: self.is_ingesting,
            progress: self.progress,
            progress_step: self.progress_step,
            progress_message: progress::message_for(self.progress_step),
            error: self.error.clone(),
        }
    }
}

/// Serializable view of the state handed to the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub phase: Phase,
    pub original_image: Option<ImagePayload>,
    pub generated_avatar: Option<ImagePayload>,
    pub is_generating: bool,
    pub selected_style: StyleOption,
    pub error: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub is_dragging: bool,
    pub is_ingesting: bool,
    pub progress: f64,
    pub progress_step: usize,
    pub progress_message: &'static str,
    pub confirm_clear: bool,
}

/// Image-free subset polled while a request or decode is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub phase: Phase,
    pub is_generating: bool,
    pub is_ingesting: bool,
    pub progress: f64,
    pub progress_step: usize,
    pub progress_message: &'static str,
    pub error: Option<String>,
}

/// Everything that can happen to the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DragHover(bool),
    /// An image upload was accepted and is being decoded.
    IngestStarted,
    IngestFailed(AppError),
    FileDecoded(ImagePayload),
    GenerateRequested,
    /// Timer sample; `elapsed` is measured from dispatch.
    ProgressTick {
        request_id: u64,
        elapsed: Duration,
    },
    GenerationSucceeded {
        request_id: u64,
        payload: ImagePayload,
        now: DateTime<Utc>,
    },
    GenerationFailed {
        request_id: u64,
        error: AppError,
    },
    StyleSelected(StyleOption),
    HistorySelected(String),
    HistoryDeleted(String),
    ClearHistoryRequested,
    ClearHistoryConfirmed,
    ClearHistoryCancelled,
}

/// Work the controller must carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Dispatch {
        request_id: u64,
        source: ImagePayload,
        style: StyleOption,
    },
    StartProgress {
        request_id: u64,
    },
    StopProgress,
    PersistHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: AppState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: AppState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    fn with(state: AppState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StateMachine {
    expected_duration: Duration,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl StateMachine {
    pub fn new(expected_duration: Duration) -> Self {
        Self { expected_duration }
    }

    /// Apply one event, returning the replacement state and follow-up effects.
    pub fn apply(&self, state: AppState, event: Event) -> Transition {
        use Event::*;

        match event {
            DragHover(active) => Transition::unchanged(AppState {
                is_dragging: active,
                ..state
            }),
            IngestStarted => Transition::unchanged(AppState {
                is_ingesting: true,
                is_dragging: false,
                ..state
            }),
            IngestFailed(error) => Transition::unchanged(AppState {
                is_ingesting: false,
                is_dragging: false,
                error: Some(error.user_message()),
                ..state
            }),
            FileDecoded(payload) => {
                if state.is_generating {
                    tracing::debug!("discarding upload decoded while a generation is pending");
                    return Transition::unchanged(AppState {
                        is_ingesting: false,
                        ..state
                    });
                }
                Transition::unchanged(AppState {
                    original_image: Some(payload),
                    generated_avatar: None,
                    error: None,
                    is_ingesting: false,
                    phase: Phase::Idle,
                    progress: 0.0,
                    progress_step: 0,
                    ..state
                })
            }
            GenerateRequested => self.on_generate(state),
            ProgressTick {
                request_id,
                elapsed,
            } => self.on_tick(state, request_id, elapsed),
            GenerationSucceeded {
                request_id,
                payload,
                now,
            } => self.on_success(state, request_id, payload, now),
            GenerationFailed { request_id, error } => self.on_failure(state, request_id, error),
            StyleSelected(style) => {
                if state.is_generating {
                    return Transition::unchanged(state);
                }
                Transition::unchanged(AppState {
                    selected_style: style,
                    ..state
                })
            }
            HistorySelected(id) => {
                if state.is_generating {
                    return Transition::unchanged(state);
                }
                let Some(item) = history::find(&state.history, &id).cloned() else {
                    return Transition::unchanged(state);
                };
                Transition::unchanged(AppState {
                    original_image: Some(item.original_image),
                    generated_avatar: Some(item.generated_avatar),
                    selected_style: item.style,
                    error: None,
                    phase: Phase::Succeeded,
                    progress: progress::COMPLETE,
                    progress_step: progress::step_for(progress::COMPLETE),
                    ..state
                })
            }
            HistoryDeleted(id) => {
                if history::find(&state.history, &id).is_none() {
                    return Transition::unchanged(state);
                }
                let history = history::remove_by_id(&state.history, &id);
                Transition::with(
                    AppState { history, ..state },
                    vec![Effect::PersistHistory],
                )
            }
            ClearHistoryRequested => Transition::unchanged(AppState {
                confirm_clear: true,
                ..state
            }),
            ClearHistoryCancelled => Transition::unchanged(AppState {
                confirm_clear: false,
                ..state
            }),
            ClearHistoryConfirmed => {
                if !state.confirm_clear {
                    return Transition::unchanged(state);
                }
                Transition::with(
                    AppState {
                        history: Vec::new(),
                        confirm_clear: false,
                        ..state
                    },
                    vec![Effect::PersistHistory],
                )
            }
        }
    }

    fn on_generate(&self, state: AppState) -> Transition {
        let Some(source) = state.original_image.clone() else {
            return Transition::unchanged(state);
        };
        if state.is_generating {
            return Transition::unchanged(state);
        }

        let request_id = state.next_request_id + 1;
        let style = state.selected_style;
        let effects = vec![
            Effect::StartProgress { request_id },
            Effect::Dispatch {
                request_id,
                source: source.clone(),
                style,
            },
        ];
        Transition::with(
            AppState {
                is_generating: true,
                error: None,
                generated_avatar: None,
                phase: Phase::Generating,
                progress: 0.0,
                progress_step: 0,
                pending: Some(PendingRequest {
                    id: request_id,
                    source,
                    style,
                }),
                next_request_id: request_id,
                ..state
            },
            effects,
        )
    }

    fn on_tick(&self, state: AppState, request_id: u64, elapsed: Duration) -> Transition {
        if !is_pending(&state, request_id) {
            return Transition::unchanged(state);
        }
        let sample = progress::estimate(elapsed, self.expected_duration);
        let percent = sample.percent.max(state.progress);
        Transition::unchanged(AppState {
            progress: percent,
            progress_step: progress::step_for(percent),
            ..state
        })
    }

    fn on_success(
        &self,
        state: AppState,
        request_id: u64,
        payload: ImagePayload,
        now: DateTime<Utc>,
    ) -> Transition {
        let Some(pending) = state.pending.clone().filter(|p| p.id == request_id) else {
            return Transition::unchanged(state);
        };

        let timestamp = now.timestamp_millis();
        let item = HistoryItem::new(
            history::next_id(&state.history, timestamp),
            pending.source,
            payload.clone(),
            pending.style,
            timestamp,
        );
        let history = history::push_capped(&state.history, item);
        Transition::with(
            AppState {
                generated_avatar: Some(payload),
                is_generating: false,
                phase: Phase::Succeeded,
                pending: None,
                progress: progress::COMPLETE,
                progress_step: progress::step_for(progress::COMPLETE),
                history,
                ..state
            },
            vec![Effect::StopProgress, Effect::PersistHistory],
        )
    }

    fn on_failure(&self, state: AppState, request_id: u64, error: AppError) -> Transition {
        if !is_pending(&state, request_id) {
            return Transition::unchanged(state);
        }
        Transition::with(
            AppState {
                is_generating: false,
                phase: Phase::Failed,
                pending: None,
                error: Some(error.user_message()),
                progress: 0.0,
                progress_step: 0,
                ..state
            },
            vec![Effect::StopProgress],
        )
    }
}

fn is_pending(state: &AppState, request_id: u64) -> bool {
    state
        .pending
        .as_ref()
        .is_some_and(|pending| pending.id == request_id)
}
