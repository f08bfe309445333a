//! Coordinator: single-owner event loop for the track queue.
//!
//! Owns the current-item slot, the pending queue, the candidate set and the
//! in-flight fetch marker. Every external input (poller messages, operator
//! lines, fetch progress and completion) arrives as a `CoordinatorEvent` on
//! one channel; nothing else mutates this state.
//!
//! The slot broadcasts each change to its listeners in order. The search
//! listener runs the search for the new item (through `with_retry`) and hands
//! its outcome back on a reaction channel, which the coordinator drains as
//! soon as the broadcast finishes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use nowgrab_proto::{PollerMessage, QueryKey, Track};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{self, OperatorCommand};
use crate::providers::{Candidate, FetchProvider, FetchedFile, SearchProvider, TagWriter};
use crate::queue::PendingQueue;
use crate::retry::{with_retry, RetryError};
use crate::session_log::{SessionEvent, SessionLog};
use crate::slot::{ReactiveSlot, SlotListener};

// ── events ────────────────────────────────────────────────────────────────────

/// All inputs into the coordinator loop.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// A decoded message from the now-playing poller.
    Poller(PollerMessage),
    /// A poller line that could not be understood.
    PollerGarbage(String),
    /// The poller process went away.
    PollerExited(String),
    /// One line of operator input.
    Operator(String),
    /// Progress or completion of the in-flight fetch.
    Fetch(FetchEvent),
    /// Stop without an operator command (e.g. stdin closed).
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Progress { id: String, percentage: f32 },
    /// `id` is the id that was requested; `file` carries the provider's own.
    Finished { id: String, file: FetchedFile },
    Failed { id: String, error: String },
}

/// Outcome of the search listener for one slot value.
#[derive(Debug)]
enum Reaction {
    Candidates {
        key: QueryKey,
        candidates: Vec<Candidate>,
    },
    SearchFailed {
        key: QueryKey,
    },
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("metadata source lost: {0}")]
    SourceFatal(String),
    #[error("slot listener failed: {0}")]
    Listener(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The external capabilities the coordinator drives.
#[derive(Clone)]
pub struct Providers {
    pub search: Arc<dyn SearchProvider>,
    pub fetch: Arc<dyn FetchProvider>,
    pub tags: Arc<dyn TagWriter>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub max_search_attempts: u32,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: String,
    /// Slot generation the fetch was started for.
    generation: u64,
}

// ── slot listeners ────────────────────────────────────────────────────────────

/// Records what the slot now holds.
struct AnnounceListener {
    log: SessionLog,
}

#[async_trait]
impl SlotListener<Track> for AnnounceListener {
    async fn on_change(&self, track: Option<&Track>) -> anyhow::Result<()> {
        match track {
            Some(track) => self.log.record(SessionEvent::Current {
                key: track.query_key(),
            }),
            None => self.log.record(SessionEvent::Waiting),
        }
        Ok(())
    }
}

/// Searches for every new non-empty slot value.
struct SearchListener {
    search: Arc<dyn SearchProvider>,
    max_attempts: u32,
    log: SessionLog,
    reactions: mpsc::UnboundedSender<Reaction>,
}

#[async_trait]
impl SlotListener<Track> for SearchListener {
    async fn on_change(&self, track: Option<&Track>) -> anyhow::Result<()> {
        let Some(track) = track else {
            return Ok(());
        };
        let key = track.query_key();
        let query = key.to_string();
        self.log.record(SessionEvent::Searching {
            query: query.clone(),
        });

        let result = with_retry(
            self.max_attempts,
            || self.search.search(&query),
            |attempt| {
                self.log.record(SessionEvent::SearchRetry {
                    query: query.clone(),
                    attempt: attempt + 1,
                });
                async {}
            },
        )
        .await;

        let reaction = match result {
            Ok(candidates) => {
                if candidates.is_empty() {
                    self.log.record(SessionEvent::NoResults { query });
                } else {
                    self.log.record(SessionEvent::Candidates {
                        query,
                        results: candidates.clone(),
                    });
                }
                Reaction::Candidates { key, candidates }
            }
            Err(err) => {
                let error = match err {
                    RetryError::NoAttempts => "search disabled (0 attempts)".to_string(),
                    other => other.to_string(),
                };
                self.log.record(SessionEvent::SearchFailed { query, error });
                Reaction::SearchFailed { key }
            }
        };

        self.reactions
            .send(reaction)
            .map_err(|_| anyhow::anyhow!("coordinator reaction channel closed"))?;
        Ok(())
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

pub struct Coordinator {
    slot: ReactiveSlot<Track>,
    /// Bumped on every slot change, so a re-announced track counts as new.
    generation: u64,
    queue: PendingQueue,
    /// Live search results for the current item; consumed by a fetch.
    candidates: Option<Vec<Candidate>>,
    /// The one permitted concurrent fetch.
    in_flight: Option<InFlight>,
    /// Requested id → originating track. Append-only.
    full_metadata: HashMap<String, Track>,
    fetcher: Arc<dyn FetchProvider>,
    tagger: Arc<dyn TagWriter>,
    output_dir: PathBuf,
    log: SessionLog,
    /// Used by fetch tasks to report back into our own loop.
    event_tx: mpsc::Sender<CoordinatorEvent>,
    reactions_rx: mpsc::UnboundedReceiver<Reaction>,
}

impl Coordinator {
    pub fn new(
        providers: Providers,
        settings: CoordinatorSettings,
        log: SessionLog,
        event_tx: mpsc::Sender<CoordinatorEvent>,
    ) -> Self {
        let (reactions_tx, reactions_rx) = mpsc::unbounded_channel();

        let mut slot = ReactiveSlot::new();
        slot.subscribe(Arc::new(AnnounceListener { log: log.clone() }));
        slot.subscribe(Arc::new(SearchListener {
            search: providers.search,
            max_attempts: settings.max_search_attempts,
            log: log.clone(),
            reactions: reactions_tx,
        }));

        Self {
            slot,
            generation: 0,
            queue: PendingQueue::new(),
            candidates: None,
            in_flight: None,
            full_metadata: HashMap::new(),
            fetcher: providers.fetch,
            tagger: providers.tags,
            output_dir: settings.output_dir,
            log,
            event_tx,
            reactions_rx,
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.slot.current()
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn candidates(&self) -> Option<&[Candidate]> {
        self.candidates.as_deref()
    }

    /// Id of the fetch currently in flight.
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.id.as_str())
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Run the event loop. Returns on `q`, on `Shutdown`, when the channel
    /// closes, or with an error when the metadata source is lost.
    pub async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<CoordinatorEvent>,
    ) -> Result<(), CoordinatorError> {
        info!("Coordinator: starting event loop");
        self.log.record(SessionEvent::Waiting);

        while let Some(event) = event_rx.recv().await {
            if self.handle_event(event).await? == Flow::Quit {
                info!("Coordinator: quit requested");
                return Ok(());
            }
        }

        info!("Coordinator: event channel closed, shutting down");
        Ok(())
    }

    pub async fn handle_event(&mut self, event: CoordinatorEvent) -> Result<Flow, CoordinatorError> {
        match event {
            CoordinatorEvent::Poller(PollerMessage::Track { data }) => {
                self.handle_track(data).await?;
            }
            CoordinatorEvent::Poller(PollerMessage::Error { error_message }) => {
                self.log.record(SessionEvent::SourceFatal {
                    message: error_message.clone(),
                });
                return Err(CoordinatorError::SourceFatal(error_message));
            }
            CoordinatorEvent::PollerGarbage(detail) => {
                self.log.record(SessionEvent::UnrecognizedMessage { detail });
            }
            CoordinatorEvent::PollerExited(reason) => {
                self.log.record(SessionEvent::SourceFatal {
                    message: reason.clone(),
                });
                return Err(CoordinatorError::SourceFatal(reason));
            }
            CoordinatorEvent::Operator(line) => {
                return self.handle_command(&line).await;
            }
            CoordinatorEvent::Fetch(FetchEvent::Progress { id, percentage }) => {
                if self.in_flight() == Some(id.as_str()) {
                    self.log.progress(&id, percentage);
                }
            }
            CoordinatorEvent::Fetch(terminal) => {
                self.handle_fetch_terminal(terminal).await?;
            }
            CoordinatorEvent::Shutdown => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    // ── ingestion ─────────────────────────────────────────────────────────────

    async fn handle_track(&mut self, track: Track) -> Result<(), CoordinatorError> {
        let track = track.trimmed();
        let key = track.query_key();

        match self.slot.current().map(Track::query_key) {
            None => self.set_current(Some(track)).await?,
            Some(current) if current == key => {
                debug!("ignoring {}: already current", key);
            }
            Some(_) => {
                if self.queue.enqueue(track, self.slot.current()) {
                    self.log.record(SessionEvent::Queued { key });
                    self.log.queue_changed(self.queue.keys());
                } else {
                    debug!("ignoring {}: already queued", key);
                }
            }
        }
        Ok(())
    }

    // ── operator ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, line: &str) -> Result<Flow, CoordinatorError> {
        let parsed = command::parse(
            line,
            self.candidates.as_ref().map(Vec::len),
            self.slot.current().is_some(),
        );

        let cmd = match parsed {
            Ok(cmd) => cmd,
            Err(e) => {
                self.log.record(SessionEvent::InvalidCommand {
                    input: line.trim().to_string(),
                    reason: e.to_string(),
                });
                return Ok(Flow::Continue);
            }
        };

        match cmd {
            OperatorCommand::Quit => return Ok(Flow::Quit),
            OperatorCommand::Skip => self.skip().await?,
            OperatorCommand::DiscardNewest => {
                if let Some(track) = self.queue.discard_newest() {
                    self.log.record(SessionEvent::Discarded {
                        key: track.query_key(),
                    });
                    self.log.queue_changed(self.queue.keys());
                }
            }
            OperatorCommand::Select(index) => {
                let candidate = self
                    .candidates
                    .as_ref()
                    .and_then(|c| c.get(index - 1))
                    .cloned();
                if let Some(candidate) = candidate {
                    self.begin_fetch(candidate.id.clone(), Some(candidate));
                }
            }
            OperatorCommand::FetchId(id) => self.begin_fetch(id, None),
        }
        Ok(Flow::Continue)
    }

    /// Drop the current item and move on. A fetch already running for it is
    /// not cancelled; its completion is still tagged but won't advance again.
    async fn skip(&mut self) -> Result<(), CoordinatorError> {
        if let Some(current) = self.slot.current() {
            self.log.record(SessionEvent::Skipped {
                key: current.query_key(),
            });
        }
        self.advance().await
    }

    // ── pipeline ──────────────────────────────────────────────────────────────

    fn begin_fetch(&mut self, id: String, candidate: Option<Candidate>) {
        if let Some(active) = &self.in_flight {
            self.log.record(SessionEvent::FetchRejected {
                requested: id,
                in_flight: active.id.clone(),
            });
            return;
        }
        let Some(track) = self.slot.current().cloned() else {
            self.log.record(SessionEvent::InvalidCommand {
                input: id,
                reason: "nothing is waiting to be fetched".to_string(),
            });
            return;
        };

        self.candidates = None;
        self.full_metadata.insert(id.clone(), track.clone());
        self.in_flight = Some(InFlight {
            id: id.clone(),
            generation: self.generation,
        });
        self.log.record(SessionEvent::Selected {
            id: id.clone(),
            candidate,
            track: track.clone(),
        });

        let destination = self.output_dir.join(track.file_name());
        let fetcher = Arc::clone(&self.fetcher);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::channel::<f32>(32);

            let forward_tx = event_tx.clone();
            let forward_id = id.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(percentage) = progress_rx.recv().await {
                    let event = FetchEvent::Progress {
                        id: forward_id.clone(),
                        percentage,
                    };
                    if forward_tx.send(CoordinatorEvent::Fetch(event)).await.is_err() {
                        break;
                    }
                }
            });

            let result = fetcher.fetch(&id, &destination, progress_tx).await;
            // progress sender is dropped with the fetch future, so this ends
            if let Err(e) = forwarder.await {
                warn!("progress forwarder for {} failed: {}", id, e);
            }

            let terminal = match result {
                Ok(file) => FetchEvent::Finished { id, file },
                Err(e) => FetchEvent::Failed {
                    id,
                    error: e.to_string(),
                },
            };
            let _ = event_tx.send(CoordinatorEvent::Fetch(terminal)).await;
        });
    }

    async fn handle_fetch_terminal(&mut self, event: FetchEvent) -> Result<(), CoordinatorError> {
        let id = match &event {
            FetchEvent::Finished { id, .. } | FetchEvent::Failed { id, .. } => id.clone(),
            FetchEvent::Progress { .. } => return Ok(()),
        };
        // A completion nobody is waiting for is still tagged when it can be,
        // but it never touches the in-flight marker or the slot.
        let finished = match self.in_flight.take() {
            Some(active) if active.id == id => Some(active),
            other => {
                warn!("terminal event for {} does not match in-flight fetch", id);
                self.in_flight = other;
                None
            }
        };

        match event {
            FetchEvent::Finished { id, file } => {
                self.log.record(SessionEvent::Fetched {
                    id: file.id.clone(),
                    title: file.title.clone(),
                });
                // keyed by the requested id; the provider may report another
                match self.full_metadata.get(&id) {
                    None => self.log.record(SessionEvent::MetadataMissing {
                        id: id.clone(),
                        title: file.title.clone(),
                    }),
                    Some(track) => match self.tagger.write_tags(&file.path, track).await {
                        Ok(()) => self.log.record(SessionEvent::Tagged {
                            id: file.id.clone(),
                            file: file.path.display().to_string(),
                        }),
                        Err(e) => self.log.record(SessionEvent::TagFailed {
                            id: file.id.clone(),
                            title: file.title.clone(),
                            error: e.to_string(),
                        }),
                    },
                }
            }
            FetchEvent::Failed { error, .. } => {
                self.log.record(SessionEvent::FetchFailed { id, error });
            }
            FetchEvent::Progress { .. } => {}
        }

        // An operator skip may already have moved past this item, even if the
        // same track has since come back into the slot.
        if finished.is_some_and(|f| f.generation == self.generation) {
            self.advance().await?;
        }
        Ok(())
    }

    /// Promote the next queued track into the slot (or empty it).
    async fn advance(&mut self) -> Result<(), CoordinatorError> {
        let next = self.queue.promote();
        self.set_current(next).await?;
        self.log.queue_changed(self.queue.keys());
        Ok(())
    }

    /// Set the slot and apply the listeners' reactions. A failed search gives
    /// up on the item, which promotes the next one; that repeats until a
    /// search succeeds or the queue runs dry.
    async fn set_current(&mut self, mut next: Option<Track>) -> Result<(), CoordinatorError> {
        loop {
            self.candidates = None;
            self.generation += 1;
            self.slot.set(next).await?;

            let mut give_up = false;
            while let Ok(reaction) = self.reactions_rx.try_recv() {
                give_up |= self.apply_reaction(reaction);
            }
            if !give_up {
                return Ok(());
            }
            next = self.queue.promote();
        }
    }

    /// Returns true when the current item should be abandoned.
    fn apply_reaction(&mut self, reaction: Reaction) -> bool {
        let current = self.slot.current().map(Track::query_key);
        match reaction {
            Reaction::Candidates { key, candidates } => {
                if current.as_ref() == Some(&key) {
                    self.candidates = Some(candidates);
                }
                false
            }
            Reaction::SearchFailed { key } => current.as_ref() == Some(&key),
        }
    }
}
