//! Consensus state reconciler
//!
//! Pull responses, push events and connection changes all enter one queue
//! consumed by a single apply loop, which is the only writer of
//! [`ReconcilerState`]. Each drain of the queue publishes at most one new
//! [`ReconciledState`].
//!
//! Fetches run concurrently on the loop's task set and post their outcome
//! back into the queue tagged with the request id they were issued under.

use crate::channel::EventChannel;
use crate::quorum::QuorumRule;
use crate::state::{ReconciledState, ReconcilerState};
use crate::subscriptions::{SubscriptionId, Subscribers};
use crate::types::{ChannelStatus, ReconcilerConfig, ReconcilerStats};
use parking_lot::Mutex;
use pbft_api_client::{ApiError, SnapshotFetcher};
use pbft_trade_types::{ConsensusEvent, Snapshot, SnapshotKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

enum Input {
    Event(ConsensusEvent),
    Connection(ChannelStatus),
    Refresh(SnapshotKind),
    Fetched {
        kind: SnapshotKind,
        request_id: u64,
        attempt: u32,
        outcome: Result<Snapshot, ApiError>,
    },
    Retry {
        kind: SnapshotKind,
        request_id: u64,
        attempt: u32,
    },
}

/// The apply loop and everything only it touches
struct ApplyLoop {
    inputs: mpsc::UnboundedReceiver<Input>,
    /// Handed to fetch tasks so they can post results
    sender: mpsc::UnboundedSender<Input>,
    state: ReconcilerState,
    fetcher: Arc<dyn SnapshotFetcher>,
    rule: Arc<dyn QuorumRule>,
    config: ReconcilerConfig,
    published: watch::Sender<ReconciledState>,
    listeners: Arc<Subscribers<ReconciledState>>,
    stats: Arc<Mutex<ReconcilerStats>>,
    last_epoch: u64,
    tasks: JoinSet<()>,
}

impl ApplyLoop {
    async fn run(mut self) {
        tracing::info!("Reconciler apply loop running");

        loop {
            let input = tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => continue,
            };

            let mut changed = self.handle(input);
            while let Ok(input) = self.inputs.try_recv() {
                changed |= self.handle(input);
            }

            *self.stats.lock() = self.state.stats().clone();
            if changed {
                self.publish();
            }
        }

        tracing::info!("Reconciler apply loop stopped");
    }

    /// Apply one input; true when the visible state changed
    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Event(event) => self.state.apply_event(&event, self.rule.as_ref()).is_changed(),
            Input::Connection(status) => {
                self.observe_connection(status);
                false
            }
            Input::Refresh(kind) => {
                self.issue_fetch(kind);
                false
            }
            Input::Fetched {
                kind,
                request_id,
                attempt,
                outcome,
            } => match outcome {
                Ok(snapshot) => self.state.apply_snapshot(request_id, snapshot).is_changed(),
                Err(e) => self.handle_failure(kind, request_id, attempt, e),
            },
            Input::Retry {
                kind,
                request_id,
                attempt,
            } => {
                if self.state.is_latest(kind, request_id) {
                    self.spawn_fetch(kind, request_id, attempt);
                }
                false
            }
        }
    }

    fn observe_connection(&mut self, status: ChannelStatus) {
        if status.epoch <= self.last_epoch {
            return;
        }
        self.last_epoch = status.epoch;

        // Events may have been missed while disconnected
        if status.epoch > 1 {
            tracing::info!(
                "Push channel reconnected (epoch {}); refetching all snapshots",
                status.epoch
            );
            self.state.note_reconnect_refetch();
            for kind in SnapshotKind::ALL {
                self.issue_fetch(kind);
            }
        }
    }

    fn issue_fetch(&mut self, kind: SnapshotKind) {
        let request_id = self.state.begin_fetch(kind);
        tracing::debug!("Fetching {} (request {})", kind, request_id);
        self.spawn_fetch(kind, request_id, 0);
    }

    fn spawn_fetch(&mut self, kind: SnapshotKind, request_id: u64, attempt: u32) {
        let fetcher = self.fetcher.clone();
        let sender = self.sender.clone();
        let fetch_timeout = self.config.fetch_timeout;

        self.tasks.spawn(async move {
            let outcome = match tokio::time::timeout(fetch_timeout, fetcher.fetch(kind)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ApiError::Timeout),
            };
            let _ = sender.send(Input::Fetched {
                kind,
                request_id,
                attempt,
                outcome,
            });
        });
    }

    fn handle_failure(&mut self, kind: SnapshotKind, request_id: u64, attempt: u32, error: ApiError) -> bool {
        if !self.state.is_latest(kind, request_id) {
            tracing::debug!("Ignoring failure of superseded {} request {}", kind, request_id);
            return false;
        }

        if error.is_auth() {
            return self.state.mark_auth_required().is_changed();
        }

        if error.is_retryable() && attempt < self.config.max_fetch_retries {
            self.state.note_retry();
            let delay = self.retry_delay(attempt);
            tracing::warn!(
                "{} fetch failed: {}; retry {} of {} in {}ms",
                kind,
                error,
                attempt + 1,
                self.config.max_fetch_retries,
                delay.as_millis()
            );

            let sender = self.sender.clone();
            self.tasks.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sender.send(Input::Retry {
                    kind,
                    request_id,
                    attempt: attempt + 1,
                });
            });
            return false;
        }

        tracing::warn!("{} fetch failed: {}", kind, error);
        self.state.mark_stale(kind).is_changed()
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.config
            .retry_backoff
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.config.max_retry_backoff)
    }

    fn publish(&self) {
        let view = self.state.view();
        self.published.send_replace(view.clone());
        let delivered = self.listeners.notify(&view);
        tracing::trace!("Published reconciled state to {} listeners", delivered);
    }
}

/// Single source of truth for the consensus, history and balance view
pub struct Reconciler {
    inputs: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<ReconciledState>,
    listeners: Arc<Subscribers<ReconciledState>>,
    stats: Arc<Mutex<ReconcilerStats>>,
    /// Apply loop, until started
    pending: Mutex<Option<ApplyLoop>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Reconciler {
    pub fn new(
        fetcher: Arc<dyn SnapshotFetcher>,
        rule: Arc<dyn QuorumRule>,
        config: ReconcilerConfig,
    ) -> Self {
        let (sender, inputs) = mpsc::unbounded_channel();
        let (published, state) = watch::channel(ReconciledState::default());
        let listeners = Arc::new(Subscribers::new());
        let stats = Arc::new(Mutex::new(ReconcilerStats::default()));

        let apply_loop = ApplyLoop {
            inputs,
            sender: sender.clone(),
            state: ReconcilerState::new(config.max_tracked_results),
            fetcher,
            rule,
            config,
            published,
            listeners: listeners.clone(),
            stats: stats.clone(),
            last_epoch: 0,
            tasks: JoinSet::new(),
        };

        Self {
            inputs: sender,
            state,
            listeners,
            stats,
            pending: Mutex::new(Some(apply_loop)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the apply loop and issue the initial fetch of every slice.
    /// Must run inside a tokio runtime; later calls do nothing.
    pub fn start(&self) {
        let Some(apply_loop) = self.pending.lock().take() else {
            tracing::warn!("Reconciler already started");
            return;
        };
        self.tasks.lock().push(tokio::spawn(apply_loop.run()));
        self.refresh_all();
    }

    /// Feed `channel`'s events and connection changes into the apply loop
    pub fn attach(&self, channel: &EventChannel) -> SubscriptionId {
        let sender = self.inputs.clone();
        let subscription = channel.subscribe(move |event| {
            let _ = sender.send(Input::Event(event.clone()));
        });

        let sender = self.inputs.clone();
        let mut status = channel.watch_status();
        let forwarder = tokio::spawn(async move {
            loop {
                let current = *status.borrow_and_update();
                if sender.send(Input::Connection(current)).is_err() {
                    break;
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
        });
        self.tasks.lock().push(forwarder);

        subscription
    }

    /// Report a connection status; a new epoch after the first triggers a
    /// refetch of every slice
    pub fn observe_connection(&self, status: ChannelStatus) {
        let _ = self.inputs.send(Input::Connection(status));
    }

    pub fn push_event(&self, event: ConsensusEvent) {
        let _ = self.inputs.send(Input::Event(event));
    }

    /// Request a fresh snapshot; supersedes any outstanding fetch of `kind`
    pub fn refresh(&self, kind: SnapshotKind) {
        let _ = self.inputs.send(Input::Refresh(kind));
    }

    pub fn refresh_all(&self) {
        for kind in SnapshotKind::ALL {
            self.refresh(kind);
        }
    }

    pub fn current_state(&self) -> ReconciledState {
        self.state.borrow().clone()
    }

    /// Receiver that sees every published state
    pub fn watch(&self) -> watch::Receiver<ReconciledState> {
        self.state.clone()
    }

    /// Call `handler` after each coalesced change
    pub fn on_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ReconciledState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(handler)
    }

    pub fn remove_listener(&self, subscription_id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(subscription_id)
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats.lock().clone()
    }

    /// Stop the apply loop and outstanding fetches; listeners get nothing
    /// after this returns
    pub fn shutdown(&self) {
        self.listeners.close();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!("Reconciler shut down");
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::ServerAsserted;
    use crate::types::{ChannelConfig, ChannelState};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use futures_util::{SinkExt, StreamExt};
    use pbft_trade_types::{
        BlockEvent, ConsensusSnapshot, TradeRecord, TradeStatus, TradeType, Vote, VoteEvent,
    };
    use std::collections::{BTreeMap, BTreeSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Reply = Result<Snapshot, ApiError>;

    /// Fetcher answering from per-kind scripts, or holding history
    /// requests until the test releases them
    #[derive(Default)]
    struct FakeFetcher {
        calls: Mutex<BTreeMap<SnapshotKind, usize>>,
        scripts: Mutex<BTreeMap<SnapshotKind, VecDeque<Reply>>>,
        hold_history: AtomicBool,
        held: Mutex<Vec<oneshot::Sender<Reply>>>,
    }

    impl FakeFetcher {
        fn script(&self, kind: SnapshotKind, reply: Reply) {
            self.scripts.lock().entry(kind).or_default().push_back(reply);
        }

        fn calls(&self, kind: SnapshotKind) -> usize {
            self.calls.lock().get(&kind).copied().unwrap_or(0)
        }

        fn held_count(&self) -> usize {
            self.held.lock().len()
        }

        fn release(&self, index: usize, reply: Reply) {
            let (tx, _) = oneshot::channel();
            let sender = std::mem::replace(&mut self.held.lock()[index], tx);
            let _ = sender.send(reply);
        }

        async fn next(&self, kind: SnapshotKind) -> Reply {
            *self.calls.lock().entry(kind).or_default() += 1;

            if kind == SnapshotKind::History && self.hold_history.load(Ordering::SeqCst) {
                let (tx, rx) = oneshot::channel();
                self.held.lock().push(tx);
                return rx.await.unwrap_or(Err(ApiError::Timeout));
            }

            let scripted = self.scripts.lock().get_mut(&kind).and_then(VecDeque::pop_front);
            scripted.unwrap_or_else(|| {
                Ok(match kind {
                    SnapshotKind::Balance => Snapshot::Balance(0.0),
                    SnapshotKind::History => Snapshot::History(vec![]),
                    SnapshotKind::Consensus => Snapshot::Consensus(ConsensusSnapshot::default()),
                })
            })
        }
    }

    #[async_trait]
    impl SnapshotFetcher for FakeFetcher {
        async fn fetch_balance(&self) -> Result<f64, ApiError> {
            match self.next(SnapshotKind::Balance).await? {
                Snapshot::Balance(balance) => Ok(balance),
                other => panic!("scripted {:?} for balance", other),
            }
        }

        async fn fetch_history(&self) -> Result<Vec<TradeRecord>, ApiError> {
            match self.next(SnapshotKind::History).await? {
                Snapshot::History(records) => Ok(records),
                other => panic!("scripted {:?} for history", other),
            }
        }

        async fn fetch_consensus(&self) -> Result<ConsensusSnapshot, ApiError> {
            match self.next(SnapshotKind::Consensus).await? {
                Snapshot::Consensus(consensus) => Ok(consensus),
                other => panic!("scripted {:?} for consensus", other),
            }
        }
    }

    fn fast_config() -> ReconcilerConfig {
        ReconcilerConfig {
            fetch_timeout: Duration::from_secs(2),
            max_fetch_retries: 2,
            retry_backoff: Duration::from_millis(10),
            max_retry_backoff: Duration::from_millis(40),
            max_tracked_results: 16,
        }
    }

    fn reconciler(fetcher: &Arc<FakeFetcher>, config: ReconcilerConfig) -> Reconciler {
        Reconciler::new(fetcher.clone(), Arc::new(ServerAsserted), config)
    }

    fn record(amount: f64) -> TradeRecord {
        TradeRecord {
            trade_type: TradeType::Sell,
            amount,
            price: Some(1.5),
            node: Some("node-1".into()),
            time: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            status: TradeStatus::Success,
        }
    }

    fn vote(validator: &str, sequence: u64) -> ConsensusEvent {
        ConsensusEvent::Vote(VoteEvent {
            tx_id: "tx1".into(),
            validator_id: validator.into(),
            vote: Vote::Commit,
            sequence,
            status: None,
        })
    }

    async fn wait_for_state<F>(reconciler: &Reconciler, pred: F) -> ReconciledState
    where
        F: FnMut(&ReconciledState) -> bool,
    {
        let mut rx = reconciler.watch();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("timed out waiting for state")
            .expect("reconciler dropped");
        state.clone()
    }

    async fn eventually<F: Fn() -> bool>(check: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn test_start_loads_every_slice() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.script(SnapshotKind::Balance, Ok(Snapshot::Balance(250.0)));
        fetcher.script(SnapshotKind::History, Ok(Snapshot::History(vec![record(3.0)])));

        let reconciler = reconciler(&fetcher, fast_config());
        reconciler.start();

        let state = wait_for_state(&reconciler, |s| s.balance == Some(250.0) && !s.history.is_empty()).await;
        assert_eq!(state.history, vec![record(3.0)]);
        for kind in SnapshotKind::ALL {
            assert_eq!(fetcher.calls(kind), 1);
        }
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_slow_earlier_history_response_is_dropped() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.hold_history.store(true, Ordering::SeqCst);
        let reconciler = reconciler(&fetcher, fast_config());
        reconciler.start();

        eventually(|| fetcher.held_count() == 1).await;
        reconciler.refresh(SnapshotKind::History);
        eventually(|| fetcher.held_count() == 2).await;

        // Newer request answers first
        fetcher.release(1, Ok(Snapshot::History(vec![record(2.0)])));
        wait_for_state(&reconciler, |s| s.history == vec![record(2.0)]).await;

        fetcher.release(0, Ok(Snapshot::History(vec![record(1.0)])));
        eventually(|| reconciler.stats().superseded_responses == 1).await;
        assert_eq!(reconciler.current_state().history, vec![record(2.0)]);
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_reconnect_refetches_each_slice_once() {
        let fetcher = Arc::new(FakeFetcher::default());
        let reconciler = reconciler(&fetcher, fast_config());
        reconciler.start();
        eventually(|| SnapshotKind::ALL.iter().all(|k| fetcher.calls(*k) == 1)).await;

        let connected = |epoch| ChannelStatus {
            state: ChannelState::Connected,
            epoch,
        };
        reconciler.observe_connection(connected(1));
        reconciler.observe_connection(connected(2));
        reconciler.observe_connection(connected(2));

        eventually(|| SnapshotKind::ALL.iter().all(|k| fetcher.calls(*k) == 2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        for kind in SnapshotKind::ALL {
            assert_eq!(fetcher.calls(kind), 2);
        }
        assert_eq!(reconciler.stats().refetches_after_reconnect, 1);
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_exhausted_retries_flag_stale_and_keep_state() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.script(SnapshotKind::Balance, Ok(Snapshot::Balance(100.0)));
        let reconciler = reconciler(&fetcher, fast_config());
        reconciler.start();
        wait_for_state(&reconciler, |s| s.balance == Some(100.0)).await;

        for _ in 0..3 {
            fetcher.script(SnapshotKind::Balance, Err(ApiError::Timeout));
        }
        reconciler.refresh(SnapshotKind::Balance);

        let state = wait_for_state(&reconciler, |s| s.stale.balance).await;
        assert_eq!(state.balance, Some(100.0));
        // Initial load, first attempt, two retries
        assert_eq!(fetcher.calls(SnapshotKind::Balance), 4);
        assert_eq!(reconciler.stats().fetch_failures, 3);

        // Recovery clears the flag
        fetcher.script(SnapshotKind::Balance, Ok(Snapshot::Balance(120.0)));
        reconciler.refresh(SnapshotKind::Balance);
        let state = wait_for_state(&reconciler, |s| !s.stale.balance).await;
        assert_eq!(state.balance, Some(120.0));
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.script(SnapshotKind::History, Err(ApiError::Unauthenticated));
        let reconciler = reconciler(&fetcher, fast_config());
        reconciler.start();

        wait_for_state(&reconciler, |s| s.auth_required).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.calls(SnapshotKind::History), 1);
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_decode_failure_flags_stale_immediately() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.script(SnapshotKind::Consensus, Err(ApiError::MissingField("txId")));
        let reconciler = reconciler(&fetcher, fast_config());
        reconciler.start();

        wait_for_state(&reconciler, |s| s.stale.consensus).await;
        assert_eq!(fetcher.calls(SnapshotKind::Consensus), 1);
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_hung_fetch_times_out() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.hold_history.store(true, Ordering::SeqCst);
        let config = ReconcilerConfig {
            fetch_timeout: Duration::from_millis(30),
            max_fetch_retries: 1,
            ..fast_config()
        };
        let reconciler = reconciler(&fetcher, config);
        reconciler.start();

        wait_for_state(&reconciler, |s| s.stale.history).await;
        assert_eq!(fetcher.calls(SnapshotKind::History), 2);
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_notifies_only_on_change() {
        let fetcher = Arc::new(FakeFetcher::default());
        let reconciler = reconciler(&fetcher, fast_config());
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        reconciler.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        reconciler.start();

        reconciler.push_event(vote("v1", 1));
        reconciler.push_event(vote("v2", 2));
        reconciler.push_event(ConsensusEvent::Block(BlockEvent {
            height: 5,
            timestamp: None,
            confirmed_tx_ids: BTreeSet::new(),
            confirmed_count: 0,
        }));
        let state = wait_for_state(&reconciler, |s| {
            s.balance.is_some()
                && s.block.is_some()
                && s.results.get("tx1").map(|r| r.sequence) == Some(2)
        })
        .await;
        assert_eq!(state.results["tx1"].tally().commit, 2);
        eventually(|| SnapshotKind::ALL.iter().all(|k| fetcher.calls(*k) == 1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Balance load plus three events, possibly coalesced
        let settled = notifications.load(Ordering::SeqCst);
        assert!((1..=4).contains(&settled));

        // Stale inputs change nothing
        reconciler.push_event(vote("v1", 0));
        reconciler.push_event(ConsensusEvent::Block(BlockEvent {
            height: 4,
            timestamp: None,
            confirmed_tx_ids: BTreeSet::new(),
            confirmed_count: 0,
        }));
        eventually(|| reconciler.stats().stale_discarded == 2).await;
        assert_eq!(notifications.load(Ordering::SeqCst), settled);
        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_attached_channel_reconnect_refetches() {
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        // First connection delivers a vote then drops; the second stays up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut first = true;
            while let Ok((stream, _)) = listener.accept().await {
                let drop_after_vote = first;
                first = false;
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };
                    let frame = r#"{"txId":"tx9","validatorId":"v1","vote":"commit","sequence":3}"#;
                    if ws.send(Message::Text(frame.to_string())).await.is_err() {
                        return;
                    }
                    if drop_after_vote {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let fetcher = Arc::new(FakeFetcher::default());
        let reconciler = reconciler(&fetcher, fast_config());
        let channel = EventChannel::new(ChannelConfig {
            url: format!("ws://{}", addr),
            initial_backoff: Duration::from_millis(20),
            jitter: 0.0,
            ..Default::default()
        });
        reconciler.attach(&channel);
        reconciler.start();
        channel.start().unwrap();

        let mut status = channel.watch_status();
        tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.epoch >= 2))
            .await
            .unwrap()
            .unwrap();

        eventually(|| SnapshotKind::ALL.iter().all(|k| fetcher.calls(*k) == 2)).await;
        let state = wait_for_state(&reconciler, |s| s.results.contains_key("tx9")).await;
        assert_eq!(state.results["tx9"].sequence, 3);
        assert_eq!(reconciler.stats().refetches_after_reconnect, 1);

        channel.stop();
        reconciler.shutdown();
    }
}
