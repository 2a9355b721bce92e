//! Poll loop: periodic snapshot fetch, look-back filtering, de-duplication,
//! and hand-off to the dispatcher.
//!
//! ```text
//! Idle ──run/spawn──▶ Polling ──stop()──▶ Stopped
//! ```
//!
//! Fetches are strictly sequential. The stop flag is observed at the top of
//! each iteration and interrupts the sleep between iterations; handlers
//! already dispatched keep running.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zalo_core::{MessageEvent, Snapshot, ZaloError, ZaloResult};

use crate::dispatch::Dispatcher;
use crate::hooks::{LifecycleHooks, TracingHooks};

/// Messages older than this, relative to the local clock, are ignored.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(10);

/// The seen-id set is cleared once it grows past this many entries.
pub const SEEN_SET_CAP: usize = 10_000_000;

/// Current unix time in milliseconds.
pub fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Message ids already dispatched.
///
/// Unbounded in principle; once it holds more than `cap` entries the next
/// insert clears it first. An id cleared this way may be dispatched again if
/// it is still inside the look-back window.
#[derive(Debug)]
pub struct SeenSet {
    ids: HashSet<String>,
    cap: usize,
    high_water: Option<i64>,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::with_cap(SEEN_SET_CAP)
    }
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            ids: HashSet::new(),
            cap,
            high_water: None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: &str, ts: i64) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.ids.len() > self.cap {
            info!(entries = self.ids.len(), "seen-id set over capacity, clearing");
            self.ids.clear();
        }
        self.ids.insert(id.to_string());
        self.high_water = Some(self.high_water.map_or(ts, |hw| hw.max(ts)));
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Newest timestamp recorded so far.
    pub fn high_water(&self) -> Option<i64> {
        self.high_water
    }
}

/// Poll loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Stopped,
}

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between fetches.
    pub interval: Duration,
    /// Look-back window applied to message timestamps.
    pub lookback: Duration,
    /// Seen-id set capacity before it is cleared.
    pub seen_cap: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            lookback: DEFAULT_LOOKBACK,
            seen_cap: SEEN_SET_CAP,
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub dispatched: u64,
    pub fetch_failures: u64,
}

/// Where the poll loop gets its latest-messages snapshot from.
pub trait SnapshotSource: Send + Sync {
    fn fetch_snapshot(&self) -> Pin<Box<dyn Future<Output = ZaloResult<Snapshot>> + Send + '_>>;
}

/// Control surface of a running (or finished) poll loop.
pub struct PollHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<PollState>,
    task: Option<JoinHandle<PollStats>>,
}

impl PollHandle {
    /// Ask the loop to stop. No fetch starts after the loop observes this.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> PollState {
        *self.state_rx.borrow()
    }

    /// Wait until the loop reaches `state`.
    pub async fn wait_for(&mut self, state: PollState) -> ZaloResult<()> {
        self.state_rx
            .wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| ZaloError::Other("poll loop dropped".into()))
    }

    /// Wait for a spawned loop to finish and return its counters.
    pub async fn join(mut self) -> ZaloResult<PollStats> {
        let task = self
            .task
            .take()
            .ok_or_else(|| ZaloError::Other("poll loop was not spawned".into()))?;
        task.await
            .map_err(|e| ZaloError::Other(format!("poll loop task failed: {e}")))
    }
}

/// The polling loop.
pub struct PollLoop<S> {
    source: S,
    dispatcher: Dispatcher,
    hooks: Arc<dyn LifecycleHooks>,
    own_user_id: String,
    config: PollConfig,
    seen: SeenSet,
    errors: Option<mpsc::Sender<ZaloError>>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<PollState>,
}

impl<S: SnapshotSource + 'static> PollLoop<S> {
    pub fn new(
        source: S,
        dispatcher: Dispatcher,
        own_user_id: impl Into<String>,
        config: PollConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(PollState::Idle);
        Self {
            source,
            dispatcher,
            hooks: Arc::new(TracingHooks),
            own_user_id: own_user_id.into(),
            seen: SeenSet::with_cap(config.seen_cap),
            config,
            errors: None,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            state_tx,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Also report fetch errors on `errors`. Reports are dropped when the
    /// channel is full.
    pub fn with_error_reports(mut self, errors: mpsc::Sender<ZaloError>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// A handle that can stop the loop and observe its state.
    pub fn handle(&self) -> PollHandle {
        PollHandle {
            stop_tx: self.stop_tx.clone(),
            state_rx: self.state_tx.subscribe(),
            task: None,
        }
    }

    /// Run the loop on a new task.
    pub fn spawn(self) -> PollHandle {
        let mut handle = self.handle();
        handle.task = Some(tokio::spawn(self.run()));
        handle
    }

    /// Run the loop on the current task until stopped.
    pub async fn run(mut self) -> PollStats {
        let mut stats = PollStats::default();
        let mut stop_rx = self.stop_rx.clone();

        self.state_tx.send_replace(PollState::Polling);
        self.hooks.on_listening();

        loop {
            if *stop_rx.borrow() {
                break;
            }

            match self.source.fetch_snapshot().await {
                Ok(snapshot) => {
                    let dispatched = self.process_snapshot(&snapshot, unix_now_ms());
                    stats.dispatched += dispatched.len() as u64;
                }
                Err(e) => {
                    stats.fetch_failures += 1;
                    if e.is_session_error() {
                        warn!("fetching messages failed, session may need a new login: {}", e);
                    } else {
                        warn!("fetching messages failed: {}", e);
                    }
                    if let Some(tx) = &self.errors {
                        let _ = tx.try_send(e);
                    }
                }
            }
            stats.cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = stop_rx.changed() => {}
            }
        }

        self.state_tx.send_replace(PollState::Stopped);
        info!(
            cycles = stats.cycles,
            dispatched = stats.dispatched,
            fetch_failures = stats.fetch_failures,
            "stopped listening"
        );
        stats
    }

    /// Filter, de-duplicate, normalize, and dispatch one snapshot. Returns
    /// the ids dispatched, in dispatch order.
    pub fn process_snapshot(&mut self, snapshot: &Snapshot, now_ms: i64) -> Vec<String> {
        let cutoff = now_ms - self.config.lookback.as_millis() as i64;
        let mut dispatched = Vec::new();

        if snapshot.skipped > 0 {
            debug!(skipped = snapshot.skipped, "dropped unparseable snapshot items");
        }

        for (index, (thread_type, raw)) in snapshot.iter().enumerate() {
            if raw.ts < cutoff {
                continue;
            }
            if !self.seen.insert(&raw.msg_id, raw.ts) {
                continue;
            }

            let event = MessageEvent::from_raw(raw, thread_type, &self.own_user_id, index);
            debug!(
                msg_id = %event.message_id,
                thread_id = %event.thread_id,
                thread_type = %event.thread_type,
                "new message"
            );
            dispatched.push(event.message_id.clone());
            self.dispatcher.dispatch(event);
        }

        dispatched
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchConfig, HandlerRegistry};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::timeout;

    /// Source that replays queued results, then returns empty snapshots.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        queue: Arc<Mutex<VecDeque<ZaloResult<Snapshot>>>>,
        fetches: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn push(&self, result: ZaloResult<Snapshot>) {
            self.queue.lock().unwrap().push_back(result);
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn fetch_snapshot(
            &self,
        ) -> Pin<Box<dyn Future<Output = ZaloResult<Snapshot>> + Send + '_>> {
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                self.queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(Snapshot::default()))
            })
        }
    }

    fn msg(id: &str, ts: i64) -> serde_json::Value {
        json!({
            "msgId": id,
            "cliMsgId": format!("c{id}"),
            "uidFrom": "2001",
            "idTo": "1000",
            "msgType": "webchat",
            "content": format!("text {id}"),
            "ts": ts.to_string(),
        })
    }

    fn snapshot(direct: &[(&str, i64)], group: &[(&str, i64)]) -> Snapshot {
        let direct: Vec<_> = direct.iter().map(|(id, ts)| msg(id, *ts)).collect();
        let group: Vec<_> = group.iter().map(|(id, ts)| msg(id, *ts)).collect();
        Snapshot::from_value(&json!({ "msgs": direct, "groupMsgs": group })).unwrap()
    }

    /// Poll loop whose dispatcher forwards every event on the returned channel.
    fn recording_loop(
        source: ScriptedSource,
        config: PollConfig,
    ) -> (PollLoop<ScriptedSource>, mpsc::UnboundedReceiver<MessageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = HandlerRegistry::new();
        registry.on_message(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
                anyhow::Ok(())
            }
        });
        let dispatcher = Dispatcher::new(registry, &DispatchConfig::default());
        (PollLoop::new(source, dispatcher, "1000", config), rx)
    }

    fn fast() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lookback_window_drops_old_messages() {
        let now = 1_700_000_000_000;
        let (mut poll, mut rx) = recording_loop(ScriptedSource::default(), fast());

        let snap = snapshot(&[("m1", now - 3_000), ("m2", now - 20_000)], &[]);
        assert_eq!(poll.process_snapshot(&snap, now), ["m1"]);

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.message_id, "m1");
        assert!(!poll.seen().contains("m2"));
    }

    #[tokio::test]
    async fn overlapping_snapshots_dispatch_each_id_once() {
        let now = 1_700_000_000_000;
        let (mut poll, mut rx) = recording_loop(ScriptedSource::default(), fast());

        let first = snapshot(&[("m1", now - 1_000), ("m2", now - 500)], &[]);
        let second = snapshot(&[("m2", now - 500), ("m3", now - 100)], &[]);
        assert_eq!(poll.process_snapshot(&first, now), ["m1", "m2"]);
        assert_eq!(poll.process_snapshot(&second, now), ["m3"]);
        assert!(poll.process_snapshot(&second, now).is_empty());

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap().message_id);
        }
        ids.sort();
        assert_eq!(ids, ["m1", "m2", "m3"]);
        assert_eq!(poll.seen().high_water(), Some(now - 100));
    }

    #[tokio::test]
    async fn unparseable_items_are_counted_not_dispatched() {
        let now = 1_700_000_000_000;
        let (mut poll, _rx) = recording_loop(ScriptedSource::default(), fast());

        let mut broken = msg("bad", now);
        broken["ts"] = json!("soon");
        let snap = Snapshot::from_value(&json!({
            "msgs": [msg("ok", now), broken],
            "groupMsgs": [{"msgId": "no-ts"}]
        }))
        .unwrap();

        assert_eq!(snap.skipped, 2);
        assert_eq!(poll.process_snapshot(&snap, now), ["ok"]);
        assert!(!poll.seen().contains("bad"));
    }

    #[tokio::test]
    async fn direct_items_precede_group_items() {
        let now = 1_700_000_000_000;
        let (mut poll, _rx) = recording_loop(ScriptedSource::default(), fast());

        let snap = snapshot(&[("d1", now), ("d2", now)], &[("g1", now), ("g2", now)]);
        assert_eq!(poll.process_snapshot(&snap, now), ["d1", "d2", "g1", "g2"]);
    }

    #[tokio::test]
    async fn events_are_normalized_against_own_user_id() {
        let now = 1_700_000_000_000;
        let (mut poll, mut rx) = recording_loop(ScriptedSource::default(), fast());

        let mut own = msg("s1", now);
        own["uidFrom"] = json!("0");
        own["idTo"] = json!("3003");
        let snap = Snapshot::from_value(&json!({ "msgs": [own], "groupMsgs": [] })).unwrap();
        poll.process_snapshot(&snap, now);

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.author_id, "1000");
        assert_eq!(event.thread_id, "3003");
    }

    #[tokio::test]
    async fn run_dispatches_and_stops() {
        let source = ScriptedSource::default();
        source.push(Ok(snapshot(&[("m1", unix_now_ms())], &[])));
        let (poll, mut rx) = recording_loop(source.clone(), fast());

        let mut handle = poll.spawn();
        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.message_id, "m1");
        assert_eq!(handle.state(), PollState::Polling);

        handle.stop();
        timeout(Duration::from_secs(2), handle.wait_for(PollState::Stopped))
            .await
            .unwrap()
            .unwrap();
        let fetched = source.fetches();
        let stats = handle.join().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.fetches(), fetched, "fetch started after stop");
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.fetch_failures, 0);
    }

    #[tokio::test]
    async fn stop_before_start_fetches_nothing() {
        let source = ScriptedSource::default();
        let (poll, _rx) = recording_loop(source.clone(), fast());
        let handle = poll.handle();
        assert_eq!(handle.state(), PollState::Idle);

        handle.stop();
        let stats = poll.run().await;
        assert_eq!(source.fetches(), 0);
        assert_eq!(stats.cycles, 0);
        assert_eq!(handle.state(), PollState::Stopped);
    }

    #[tokio::test]
    async fn stop_interrupts_the_sleep() {
        let source = ScriptedSource::default();
        let config = PollConfig {
            interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let (poll, _rx) = recording_loop(source.clone(), config);
        let handle = poll.spawn();

        timeout(Duration::from_secs(2), async {
            while source.fetches() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        handle.stop();
        let stats = timeout(Duration::from_secs(2), handle.join()).await.unwrap().unwrap();
        assert_eq!(stats.cycles, 1);
    }

    #[tokio::test]
    async fn fetch_errors_are_reported_and_polling_continues() {
        let source = ScriptedSource::default();
        source.push(Err(ZaloError::Transport("connection reset".into())));
        source.push(Ok(snapshot(&[("m1", unix_now_ms())], &[])));

        let (poll, mut rx) = recording_loop(source, fast());
        let (err_tx, mut err_rx) = mpsc::channel(4);
        let handle = poll.with_error_reports(err_tx).spawn();

        let err = timeout(Duration::from_secs(2), err_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(err, ZaloError::Transport(_)));
        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.message_id, "m1");

        handle.stop();
        let stats = handle.join().await.unwrap();
        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.dispatched, 1);
    }

    #[test]
    fn seen_set_rejects_duplicates() {
        let mut seen = SeenSet::new();
        assert!(seen.insert("a", 1));
        assert!(!seen.insert("a", 1));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn seen_set_clears_once_over_capacity() {
        let mut seen = SeenSet::with_cap(3);
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            assert!(seen.insert(id, i as i64));
        }
        assert_eq!(seen.len(), 4);

        assert!(seen.insert("e", 10));
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("e"));
        assert!(!seen.contains("a"));
        assert_eq!(seen.high_water(), Some(10));
    }
}
