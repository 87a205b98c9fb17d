//! Feed lifecycle: backfill once, then tail live logs until stopped.

use alloy::primitives::Address;
use ledger_chain::ChainReader;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backfill::BackfillScanner;
use crate::decode::EntryDecoder;
use crate::feed::{FeedDefinition, FeedName, FeedSettings};
use crate::live::LiveTail;
use crate::registry::TokenRegistry;
use crate::store::{FeedState, MergeStore, StoreWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// Not configured (no principal, no sources or a zero address); never touches the chain.
    Idle,
    Backfilling,
    Live,
    Stopped,
}

impl Display for FeedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Idle => "idle",
            Self::Backfilling => "backfilling",
            Self::Live => "live",
            Self::Stopped => "stopped",
        };
        write!(f, "{phase}")
    }
}

struct Control {
    writer: StoreWriter,
    shutdown: watch::Sender<bool>,
    phase: Arc<watch::Sender<FeedPhase>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Consumer side of a running feed. Cheap to clone; every clone controls the
/// same controller.
#[derive(Clone)]
pub struct FeedHandle {
    name: FeedName,
    principal_scoped: bool,
    store: MergeStore,
    phase: watch::Receiver<FeedPhase>,
    control: Arc<Control>,
}

impl fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandle")
            .field("name", &self.name)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl FeedHandle {
    pub const fn name(&self) -> FeedName {
        self.name
    }

    pub fn current_state(&self) -> Arc<FeedState> {
        self.store.snapshot()
    }

    pub fn changes(&self) -> watch::Receiver<Arc<FeedState>> {
        self.store.subscribe()
    }

    pub fn phase(&self) -> FeedPhase {
        *self.phase.borrow()
    }

    pub fn phases(&self) -> watch::Receiver<FeedPhase> {
        self.phase.clone()
    }

    /// Runs `callback` with new states of the feed's store until the feed is
    /// stopped for good. A [`FeedHub`] restart keeps the same store, so the
    /// callback keeps firing for the restarted controller.
    ///
    /// States are sampled from a watch channel: updates that land faster than
    /// the callback runs are coalesced and only the newest snapshot is seen.
    /// Every snapshot is complete, so no entry is ever skipped.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Arc<FeedState>) + Send + 'static,
    {
        let mut changes = self.changes();
        let mut retirement = self.store.retirement();

        tokio::spawn(async move {
            if *retirement.borrow_and_update() {
                return;
            }

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = changes.borrow_and_update().clone();
                        callback(state);
                    }
                    changed = retirement.changed() => {
                        if changed.is_err() || *retirement.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stops the controller and retires the store. Nothing the controller
    /// produces after this call is applied, and `on_change` watchers end.
    pub async fn stop(&self) {
        self.halt().await;
        self.store.retire();
    }

    /// Seals the store writer, stops the controller task and closes its live
    /// subscriptions, leaving the store open for a successor controller.
    async fn halt(&self) {
        self.control.writer.seal();
        self.control.shutdown.send_replace(true);

        let task = self.control.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("{} feed controller task panicked: {e}", self.name);
            }
        }

        let stopped = self.control.phase.send_if_modified(|phase| {
            let changed = *phase != FeedPhase::Stopped;
            *phase = FeedPhase::Stopped;
            changed
        });

        if stopped {
            info!("{} feed stopped", self.name);
        }
    }
}

/// Everything one controller task owns.
pub struct FeedController<C> {
    chain: Arc<C>,
    definition: FeedDefinition,
    decoder: Arc<EntryDecoder<C>>,
    settings: FeedSettings,
    writer: StoreWriter,
    phase: Arc<watch::Sender<FeedPhase>>,
}

impl<C: ChainReader> FeedController<C> {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            chain,
            definition,
            decoder,
            settings,
            writer,
            phase,
        } = self;

        let scanner = BackfillScanner::new(chain.clone(), decoder.clone(), settings);
        let backfill = tokio::select! {
            result = scanner.scan(&definition) => result,
            () = shutdown_requested(&mut shutdown) => {
                info!("{} feed stopped during backfill", definition.name);
                return;
            }
        };

        match backfill {
            Ok(entries) => {
                writer.replace_all(entries);
            }
            Err(e) => {
                warn!("{} backfill failed: {e}", definition.name);
                writer.fail_backfill(e.to_string());
            }
        }

        let (batch_sender, mut batches) = mpsc::unbounded_channel();
        let tail = LiveTail::start(chain, decoder, &definition, batch_sender).await;

        if !*shutdown.borrow() {
            phase.send_replace(FeedPhase::Live);

            loop {
                tokio::select! {
                    Some(batch) = batches.recv() => {
                        debug!("{} live batch with {} entries", definition.name, batch.len());
                        if !batch.is_empty() {
                            writer.merge_incremental(batch);
                        }
                    }
                    () = shutdown_requested(&mut shutdown) => break,
                }
            }
        }

        let failures = tail.unsubscribe().await;
        if !failures.is_empty() {
            warn!(
                "{} feed left {} live subscriptions open",
                definition.name,
                failures.len()
            );
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means nobody can stop us any more; treat it as a stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Starts a feed with its own fresh store.
pub fn start_feed<C: ChainReader>(
    chain: Arc<C>,
    definition: FeedDefinition,
    principal: Option<Address>,
    registry: Arc<TokenRegistry>,
    settings: FeedSettings,
) -> FeedHandle {
    spawn_controller(&MergeStore::new(), chain, definition, principal, registry, settings)
}

fn spawn_controller<C: ChainReader>(
    store: &MergeStore,
    chain: Arc<C>,
    definition: FeedDefinition,
    principal: Option<Address>,
    registry: Arc<TokenRegistry>,
    settings: FeedSettings,
) -> FeedHandle {
    let name = definition.name;
    let principal_scoped = definition.principal_scoped;
    let writer = store.writer();
    let (shutdown, shutdown_receiver) = watch::channel(false);

    let scope = definition
        .scope_for(principal)
        .filter(|_| definition.is_configured());

    let (phase, phase_receiver) = watch::channel(if scope.is_some() {
        FeedPhase::Backfilling
    } else {
        FeedPhase::Idle
    });
    let phase = Arc::new(phase);

    let task = if let Some(scope) = scope {
        info!("Starting {name} feed for {scope:?}");
        writer.begin_resync();

        let controller = FeedController {
            decoder: Arc::new(EntryDecoder::new(
                chain.clone(),
                registry,
                scope,
                &settings,
            )),
            chain,
            definition,
            settings,
            writer: writer.clone(),
            phase: phase.clone(),
        };

        Some(tokio::spawn(controller.run(shutdown_receiver)))
    } else {
        info!("{name} feed is not configured for principal {principal:?}, staying idle");
        writer.settle_idle();
        None
    };

    FeedHandle {
        name,
        principal_scoped,
        store: store.clone(),
        phase: phase_receiver,
        control: Arc::new(Control {
            writer,
            shutdown,
            phase,
            task: Mutex::new(task),
        }),
    }
}

/// Keeps at most one running controller per (feed, principal). Starting a
/// feed that is already running stops the old controller and resynchronizes
/// into the same store, so `changes` receivers and `on_change` watchers of
/// the old handle keep receiving updates.
pub struct FeedHub<C> {
    chain: Arc<C>,
    registry: Arc<TokenRegistry>,
    settings: FeedSettings,
    feeds: Mutex<HashMap<(FeedName, Option<Address>), FeedHandle>>,
}

impl<C: ChainReader> FeedHub<C> {
    pub fn new(chain: Arc<C>, registry: Arc<TokenRegistry>, settings: FeedSettings) -> Self {
        Self {
            chain,
            registry,
            settings,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    const fn key(definition: &FeedDefinition, principal: Option<Address>) -> (FeedName, Option<Address>) {
        if definition.principal_scoped {
            (definition.name, principal)
        } else {
            (definition.name, None)
        }
    }

    pub async fn start_feed(
        &self,
        definition: FeedDefinition,
        principal: Option<Address>,
    ) -> FeedHandle {
        let key = Self::key(&definition, principal);
        let mut feeds = self.feeds.lock().await;

        let store = match feeds.remove(&key) {
            Some(previous) if !previous.store.is_retired() => {
                info!("Restarting {} feed", definition.name);
                previous.halt().await;
                previous.store
            }
            Some(previous) => {
                previous.halt().await;
                MergeStore::new()
            }
            None => MergeStore::new(),
        };

        let handle = spawn_controller(
            &store,
            self.chain.clone(),
            definition,
            principal,
            self.registry.clone(),
            self.settings,
        );

        feeds.insert(key, handle.clone());
        handle
    }

    /// Stops the feed started under `name` for `principal`. Feeds that are
    /// not principal scoped are found whatever principal is passed.
    pub async fn stop_feed(&self, name: FeedName, principal: Option<Address>) -> bool {
        let removed = {
            let mut feeds = self.feeds.lock().await;
            let shared = (name, None);

            match feeds.remove(&(name, principal)) {
                Some(handle) => Some(handle),
                None if feeds
                    .get(&shared)
                    .is_some_and(|handle| !handle.principal_scoped) =>
                {
                    feeds.remove(&shared)
                }
                None => None,
            }
        };

        match removed {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let handles = self
            .feeds
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect::<Vec<_>>();

        futures_util::future::join_all(handles.iter().map(FeedHandle::stop)).await;
    }

    pub async fn running(&self) -> usize {
        self.feeds.lock().await.len()
    }
}
