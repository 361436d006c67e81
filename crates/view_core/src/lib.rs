use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{
    ControlState, FilterKey, FilterSet, Record, RecordId, SortDirection, SortKey, SortSpec,
    StarredSet,
};
use storage::KeyValueStore;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod debounce;
pub mod engine;
pub mod loader;
pub mod query;
pub mod starred;

use debounce::Debouncer;
use query::QueryStateStore;
use starred::StarredSetManager;

/// Quiet period applied to the debounced channels (filter edits and
/// star toggles). Sort clicks and pagination are never debounced.
pub const DEBOUNCE_QUIET_PERIOD: Duration = Duration::from_millis(300);

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Transitions of the dataset-view state machine. One handler per
/// variant; see [`ViewHandle`] for which entry points debounce.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    FilterChanged { key: FilterKey, value: String },
    SortRequested { key: SortKey, direction: SortDirection },
    StarToggled { id: RecordId },
    PageAppended { records: Vec<Record> },
    LoadMoreRequested,
}

/// Outward notifications broadcast after each transition.
#[derive(Debug, Clone)]
pub enum ViewUpdate {
    ViewChanged { view: Vec<Record> },
    ControlStateChanged { state: ControlState },
    StarredChanged { starred: StarredSet },
    Error(String),
}

/// Point-in-time copy of the composite controller state.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub view: Vec<Record>,
    pub control: ControlState,
    pub starred: StarredSet,
    pub dataset_len: usize,
}

#[derive(Debug, Error)]
pub enum ViewControllerError {
    #[error("view controller is no longer running")]
    Stopped,
}

/// External dataset source. Page size and source format are the
/// loader's concern; the controller only ever asks whether more data
/// exists and for the next page, which re-enters the machine as a
/// `PageAppended` event.
#[async_trait]
pub trait PageLoader: Send + Sync {
    fn has_more(&self) -> bool;
    async fn next_page(&self) -> Result<Vec<Record>>;
}

pub struct MissingPageLoader;

#[async_trait]
impl PageLoader for MissingPageLoader {
    fn has_more(&self) -> bool {
        false
    }

    async fn next_page(&self) -> Result<Vec<Record>> {
        Err(anyhow!("no page loader configured"))
    }
}

enum Command {
    Event(ViewEvent),
    Snapshot(oneshot::Sender<ViewSnapshot>),
}

/// The dataset-view state machine. Owns the append-only dataset, the
/// control state, the starred set, and the derived view; every
/// mutation flows through its single event loop, so transitions run to
/// completion in arrival order and no state is ever shared mutably.
pub struct ViewController {
    dataset: Vec<Record>,
    filters: FilterSet,
    sorts: SortSpec,
    starred: StarredSet,
    view: Vec<Record>,
    query_store: Arc<dyn QueryStateStore>,
    starred_manager: StarredSetManager,
    loader: Arc<dyn PageLoader>,
    commands: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<ViewUpdate>,
}

impl ViewController {
    /// Builds the machine from its collaborators and runs the
    /// `Initialize` transition: control state is decoded from the
    /// external query representation, the starred set is loaded from
    /// durable storage (absence or garbage yields the empty set), the
    /// initial view is derived, and the event loop is spawned.
    pub async fn initialize(
        initial_records: Vec<Record>,
        query_store: Arc<dyn QueryStateStore>,
        kv_store: Arc<dyn KeyValueStore>,
        loader: Arc<dyn PageLoader>,
    ) -> ViewHandle {
        let ControlState { filters, sorts } = query::decode(&query_store.read());
        let starred_manager = StarredSetManager::new(kv_store);
        let starred = starred_manager.load().await;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let view = engine::derive(&initial_records, &filters, &sorts);
        info!(
            records = initial_records.len(),
            visible = view.len(),
            starred = starred.len(),
            "view controller initialized"
        );

        let controller = ViewController {
            dataset: initial_records,
            filters,
            sorts,
            starred,
            view,
            query_store,
            starred_manager,
            loader,
            commands: commands_tx.clone(),
            updates: updates.clone(),
        };
        let task = tokio::spawn(controller.run(commands_rx));

        ViewHandle {
            filter_debounce: Debouncer::new(DEBOUNCE_QUIET_PERIOD, commands_tx.clone()),
            star_debounce: Debouncer::new(DEBOUNCE_QUIET_PERIOD, commands_tx.clone()),
            commands: commands_tx,
            updates,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Event(event) => self.apply(event),
                Command::Snapshot(reply) => {
                    let _ = reply.send(ViewSnapshot {
                        view: self.view.clone(),
                        control: self.control_state(),
                        starred: self.starred.clone(),
                        dataset_len: self.dataset.len(),
                    });
                }
            }
        }
        debug!("view controller event queue closed; stopping");
    }

    fn apply(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::FilterChanged { key, value } => {
                // An emptied input means "no constraint", not "match
                // the empty string".
                let pattern = if value.is_empty() { None } else { Some(value) };
                debug!(
                    attr = key.attr_name(),
                    cleared = pattern.is_none(),
                    "filter changed"
                );
                self.filters.set(key, pattern);
                self.refresh_view();
                self.sync_control_state();
            }
            ViewEvent::SortRequested { key, direction } => {
                debug!(
                    attr = key.attr_name(),
                    direction = direction.as_query_value(),
                    "sort requested"
                );
                self.sorts.toggle(key, direction);
                self.refresh_view();
                self.sync_control_state();
            }
            ViewEvent::StarToggled { id } => {
                self.starred.toggle(id);
                debug!(
                    record_id = id.0,
                    starred = self.starred.contains(id),
                    "star toggled"
                );
                self.persist_starred();
                let _ = self.updates.send(ViewUpdate::StarredChanged {
                    starred: self.starred.clone(),
                });
            }
            ViewEvent::PageAppended { records } => {
                debug!(appended = records.len(), "page appended");
                self.dataset.extend(records);
                self.refresh_view();
            }
            ViewEvent::LoadMoreRequested => self.request_next_page(),
        }
    }

    fn control_state(&self) -> ControlState {
        ControlState {
            filters: self.filters.clone(),
            sorts: self.sorts.clone(),
        }
    }

    fn refresh_view(&mut self) {
        self.view = engine::derive(&self.dataset, &self.filters, &self.sorts);
        let _ = self.updates.send(ViewUpdate::ViewChanged {
            view: self.view.clone(),
        });
    }

    /// Mirrors the control state into the external query
    /// representation. The codec owns the whole representation, so the
    /// store contents are replaced wholesale and stale or unrelated
    /// entries disappear.
    fn sync_control_state(&self) {
        let state = self.control_state();
        self.query_store.replace(query::encode(&state));
        let _ = self.updates.send(ViewUpdate::ControlStateChanged { state });
    }

    /// Fire-and-forget save; a failure is logged and surfaced as a
    /// non-fatal update, never retried.
    fn persist_starred(&self) {
        let manager = self.starred_manager.clone();
        let starred = self.starred.clone();
        let updates = self.updates.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.save(&starred).await {
                warn!("failed to persist starred set: {err:#}");
                let _ = updates.send(ViewUpdate::Error(format!(
                    "failed to persist starred set: {err:#}"
                )));
            }
        });
    }

    /// Relays a pagination request to the loader without blocking the
    /// loop; the fetched page re-enters the queue as `PageAppended`.
    fn request_next_page(&self) {
        if !self.loader.has_more() {
            debug!("load-more ignored: loader is exhausted");
            return;
        }

        let loader = Arc::clone(&self.loader);
        let commands = self.commands.clone();
        let updates = self.updates.clone();
        tokio::spawn(async move {
            match loader.next_page().await {
                Ok(records) => {
                    let _ = commands.send(Command::Event(ViewEvent::PageAppended { records }));
                }
                Err(err) => {
                    warn!("page load failed: {err:#}");
                    let _ = updates.send(ViewUpdate::Error(format!("page load failed: {err:#}")));
                }
            }
        });
    }
}

/// Entry points into the running machine. Dropping the handle tears
/// the machine down; debounced transitions still pending at that point
/// are discarded, not force-applied.
pub struct ViewHandle {
    commands: mpsc::UnboundedSender<Command>,
    filter_debounce: Debouncer<Command>,
    star_debounce: Debouncer<Command>,
    updates: broadcast::Sender<ViewUpdate>,
    task: JoinHandle<()>,
}

impl ViewHandle {
    /// Debounced: a burst of edits collapses into the last value seen
    /// before the channel goes quiet. All filter attributes share one
    /// channel.
    pub fn filter_changed(&self, key: FilterKey, value: impl Into<String>) {
        self.filter_debounce.submit(Command::Event(ViewEvent::FilterChanged {
            key,
            value: value.into(),
        }));
    }

    /// Immediate: repeating the currently-active (attribute,
    /// direction) pair cancels the sort on that attribute.
    pub fn sort_requested(&self, key: SortKey, direction: SortDirection) {
        let _ = self
            .commands
            .send(Command::Event(ViewEvent::SortRequested { key, direction }));
    }

    /// Debounced on its own channel, independent of filter edits.
    pub fn star_toggled(&self, id: RecordId) {
        self.star_debounce
            .submit(Command::Event(ViewEvent::StarToggled { id }));
    }

    /// Immediate: appends records to the dataset and re-derives the
    /// view over the full old+new sequence.
    pub fn page_appended(&self, records: Vec<Record>) {
        let _ = self
            .commands
            .send(Command::Event(ViewEvent::PageAppended { records }));
    }

    /// Immediate: forwards the pagination request to the loader.
    pub fn load_more(&self) {
        let _ = self.commands.send(Command::Event(ViewEvent::LoadMoreRequested));
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Answers the composite state through the event queue, so the
    /// snapshot reflects every event submitted (and already due)
    /// before it.
    pub async fn snapshot(&self) -> Result<ViewSnapshot, ViewControllerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| ViewControllerError::Stopped)?;
        rx.await.map_err(|_| ViewControllerError::Stopped)
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        // The controller keeps a sender for page re-entry, so the loop
        // would never see a closed queue on its own.
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
