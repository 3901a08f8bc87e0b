//! Single task that owns the app state and runs the side effects of each
//! transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::generation::GenerationClient;
use crate::history::{self, HistoryItem, HistoryStore};
use crate::payload::{self, FileUpload, ImagePayload};
use crate::progress::ProgressTimer;
use crate::state::{AppState, Effect, Event, ProgressView, StateMachine, StateSnapshot, Transition};
use crate::style::StyleOption;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller is not running")]
    Closed,
}

/// User-initiated actions.
#[derive(Debug)]
pub enum Command {
    Snapshot,
    SetDragging(bool),
    Ingest(FileUpload),
    Generate,
    SelectStyle(StyleOption),
    RandomStyle,
    SelectHistory(String),
    DeleteHistory(String),
    RequestClearHistory,
    ConfirmClearHistory,
    CancelClearHistory,
}

/// Which stored image a download or image fetch refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// The avatar currently on display.
    Current,
    /// The avatar of a history item.
    History(String),
    /// The source photo of a history item.
    HistoryOriginal(String),
}

#[derive(Debug)]
enum Message {
    Request {
        command: Command,
        reply: oneshot::Sender<StateSnapshot>,
    },
    Download {
        target: DownloadTarget,
        reply: oneshot::Sender<Option<ImagePayload>>,
    },
    Progress {
        reply: oneshot::Sender<ProgressView>,
    },
    Event(Event),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub progress_expected: Duration,
    pub progress_tick: Duration,
    pub max_image_edge: u32,
    pub channel_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            progress_expected: Duration::from_secs(15),
            progress_tick: Duration::from_millis(100),
            max_image_edge: 2048,
            channel_capacity: 64,
        }
    }
}

/// Cloneable front door used by the HTTP layer.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Message>,
}

impl ControllerHandle {
    pub async fn request(&self, command: Command) -> Result<StateSnapshot, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Request { command, reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, ControllerError> {
        self.request(Command::Snapshot).await
    }

    pub async fn download(
        &self,
        target: DownloadTarget,
    ) -> Result<Option<ImagePayload>, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Download { target, reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    pub async fn progress(&self) -> Result<ProgressView, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Progress { reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    /// Stop the controller; any running progress timer is released and
    /// queued history writes are flushed.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown).await;
    }
}

pub struct Controller<C> {
    machine: StateMachine,
    state: AppState,
    client: Arc<C>,
    options: ControllerOptions,
    events: mpsc::WeakSender<Message>,
    progress: Option<ProgressTimer>,
    persist: Option<mpsc::UnboundedSender<Vec<HistoryItem>>>,
    writer: Option<JoinHandle<()>>,
}

/// Load history from `store`, then run the controller on its own task.
pub fn spawn<C, S>(
    client: C,
    store: S,
    options: ControllerOptions,
) -> (ControllerHandle, JoinHandle<()>)
where
    C: GenerationClient,
    S: HistoryStore,
{
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let store = Arc::new(store);
    let history = store.load();
    tracing::info!(entries = history.len(), "loaded history");

    let (persist, writer) = spawn_writer(store);

    let controller = Controller {
        machine: StateMachine::new(options.progress_expected),
        state: AppState::with_history(history),
        client: Arc::new(client),
        options,
        events: tx.downgrade(),
        progress: None,
        persist: Some(persist),
        writer: Some(writer),
    };
    let task = tokio::spawn(controller.run(rx));
    (ControllerHandle { tx }, task)
}

/// Saves history snapshots one at a time, in the order they were queued,
/// on the blocking pool.
fn spawn_writer<S: HistoryStore>(
    store: Arc<S>,
) -> (mpsc::UnboundedSender<Vec<HistoryItem>>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<HistoryItem>>();
    let task = tokio::spawn(async move {
        while let Some(items) = rx.recv().await {
            let store = Arc::clone(&store);
            let entries = items.len();
            match tokio::task::spawn_blocking(move || store.save(&items)).await {
                Ok(Ok(())) => tracing::debug!(entries, "history persisted"),
                Ok(Err(err)) => tracing::error!(%err, "failed to persist history"),
                Err(err) => tracing::error!(%err, "history write panicked"),
            }
        }
    });
    (tx, task)
}

impl<C> Controller<C>
where
    C: GenerationClient,
{
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Request { command, reply } => {
                    self.handle_command(command);
                    let _ = reply.send(self.state.snapshot());
                }
                Message::Download { target, reply } => {
                    let _ = reply.send(self.download_source(&target));
                }
                Message::Progress { reply } => {
                    let _ = reply.send(self.state.progress_view());
                }
                Message::Event(event) => self.dispatch(event),
                Message::Shutdown => break,
            }
        }
        if let Some(timer) = self.progress.take() {
            tracing::debug!(request_id = timer.request_id(), "releasing progress timer on shutdown");
        }
        drop(self.persist.take());
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.await {
                tracing::error!(%err, "history writer stopped abnormally");
            }
        }
        tracing::info!("controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Snapshot => {}
            Command::SetDragging(active) => self.dispatch(Event::DragHover(active)),
            Command::Ingest(upload) => self.ingest(upload),
            Command::Generate => self.dispatch(Event::GenerateRequested),
            Command::SelectStyle(style) => self.dispatch(Event::StyleSelected(style)),
            Command::RandomStyle => {
                if self.state.is_generating {
                    return;
                }
                let style = self.state.selected_style.random_other(&mut rand::rng());
                self.dispatch(Event::StyleSelected(style));
            }
            Command::SelectHistory(id) => self.dispatch(Event::HistorySelected(id)),
            Command::DeleteHistory(id) => self.dispatch(Event::HistoryDeleted(id)),
            Command::RequestClearHistory => self.dispatch(Event::ClearHistoryRequested),
            Command::ConfirmClearHistory => self.dispatch(Event::ClearHistoryConfirmed),
            Command::CancelClearHistory => self.dispatch(Event::ClearHistoryCancelled),
        }
    }

    fn dispatch(&mut self, event: Event) {
        if !matches!(event, Event::ProgressTick { .. }) {
            tracing::debug!(?event, "applying event");
        }
        let state = std::mem::take(&mut self.state);
        let Transition { state, effects } = self.machine.apply(state, event);
        self.state = state;
        for effect in effects {
            self.perform(effect);
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::StartProgress { request_id } => {
                let Some(tx) = self.events.upgrade() else {
                    return;
                };
                self.progress = Some(ProgressTimer::start(
                    request_id,
                    self.options.progress_tick,
                    tx,
                    |request_id, elapsed| {
                        Message::Event(Event::ProgressTick {
                            request_id,
                            elapsed,
                        })
                    },
                ));
            }
            Effect::StopProgress => {
                self.progress = None;
            }
            Effect::Dispatch {
                request_id,
                source,
                style,
            } => self.spawn_generation(request_id, source, style),
            Effect::PersistHistory => {
                let queued = self
                    .persist
                    .as_ref()
                    .is_some_and(|tx| tx.send(self.state.history.clone()).is_ok());
                if !queued {
                    tracing::error!("history writer is gone; change not persisted");
                }
            }
        }
    }

    fn ingest(&mut self, upload: FileUpload) {
        if self.state.is_generating {
            tracing::debug!("ignoring upload while a generation is pending");
            return;
        }
        if let Err(err) = payload::validate_upload(&upload) {
            tracing::warn!(media_type = %upload.media_type, "rejected upload");
            self.dispatch(Event::IngestFailed(err));
            return;
        }
        let Some(tx) = self.events.upgrade() else {
            return;
        };
        self.dispatch(Event::IngestStarted);

        let max_edge = self.options.max_image_edge;
        tokio::spawn(async move {
            let decoded = tokio::task::spawn_blocking(move || payload::decode_upload(upload, max_edge))
                .await
                .unwrap_or_else(|e| Err(AppError::Decode(e.to_string())));
            let event = match decoded {
                Ok(payload) => Event::FileDecoded(payload),
                Err(err) => {
                    tracing::warn!(%err, "upload decode failed");
                    Event::IngestFailed(err)
                }
            };
            let _ = tx.send(Message::Event(event)).await;
        });
    }

    fn spawn_generation(&self, request_id: u64, source: ImagePayload, style: StyleOption) {
        let Some(tx) = self.events.upgrade() else {
            return;
        };
        let client = Arc::clone(&self.client);
        tracing::info!(request_id, ?style, "dispatching generation");

        tokio::spawn(async move {
            let call = tokio::spawn(async move { client.generate(&source, style).await });
            let outcome = call
                .await
                .unwrap_or_else(|e| Err(AppError::generation(format!("generation task failed: {e}"))));
            let event = match outcome {
                Ok(payload) => {
                    tracing::info!(request_id, "generation succeeded");
                    Event::GenerationSucceeded {
                        request_id,
                        payload,
                        now: Utc::now(),
                    }
                }
                Err(error) => {
                    tracing::warn!(request_id, %error, "generation failed");
                    Event::GenerationFailed { request_id, error }
                }
            };
            let _ = tx.send(Message::Event(event)).await;
        });
    }

    fn download_source(&self, target: &DownloadTarget) -> Option<ImagePayload> {
        match target {
            DownloadTarget::Current => self.state.generated_avatar.clone(),
            DownloadTarget::History(id) => {
                history::find(&self.state.history, id).map(|item| item.generated_avatar.clone())
            }
            DownloadTarget::HistoryOriginal(id) => {
                history::find(&self.state.history, id).map(|item| item.original_image.clone())
            }
        }
    }
}
