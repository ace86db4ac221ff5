use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use callcore::{CallEvent, Candidate, MediaStream, PeerId, SessionDescription};
use tokio::sync::{Notify, mpsc};

use crate::calls::{CallManager, ConnectivitySession, SessionEvent, SessionFactory};
use crate::relay::MemoryRelay;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// What a [`FakeSession`] has been asked to do so far.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub offers_created: usize,
    pub answers_created: usize,
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub remote_candidates: Vec<Candidate>,
    pub closed: bool,
}

/// Session that negotiates nothing but records every call made on it.
pub struct FakeSession {
    pub label: String,
    events: mpsc::UnboundedSender<SessionEvent>,
    log: Mutex<SessionLog>,
    gate: Option<Arc<Notify>>,
    remote_gate: Option<Arc<Notify>>,
    fail_remote: bool,
}

impl FakeSession {
    pub fn log(&self) -> SessionLog {
        self.log.lock().unwrap().clone()
    }

    /// Pushes an event as if the session produced it.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl ConnectivitySession for FakeSession {
    async fn create_offer(&self) -> Result<SessionDescription, anyhow::Error> {
        self.wait_for_gate().await;
        self.log.lock().unwrap().offers_created += 1;
        Ok(SessionDescription::offer(format!("v=0 offer {}", self.label)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, anyhow::Error> {
        self.wait_for_gate().await;
        self.log.lock().unwrap().answers_created += 1;
        Ok(SessionDescription::answer(format!("v=0 answer {}", self.label)))
    }

    async fn apply_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), anyhow::Error> {
        let mut log = self.log.lock().unwrap();
        if log.local.is_some() {
            return Err(anyhow!("local description applied twice"));
        }
        log.local = Some(description);
        Ok(())
    }

    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), anyhow::Error> {
        if let Some(gate) = &self.remote_gate {
            gate.notified().await;
        }
        if self.fail_remote {
            return Err(anyhow!("incompatible remote description"));
        }
        let mut log = self.log.lock().unwrap();
        if log.remote.is_some() {
            return Err(anyhow!("remote description applied twice"));
        }
        log.remote = Some(description);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<(), anyhow::Error> {
        self.log.lock().unwrap().remote_candidates.push(candidate);
        Ok(())
    }

    fn close(&self) {
        self.log.lock().unwrap().closed = true;
    }
}

/// Hands out [`FakeSession`]s and keeps them around for inspection.
#[derive(Default)]
pub struct FakeSessionFactory {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    created: AtomicUsize,
    gate: Option<Arc<Notify>>,
    remote_gate: Option<Arc<Notify>>,
    fail_create: bool,
    fail_remote: bool,
    local_stream: bool,
    candidates: Vec<Candidate>,
}

impl FakeSessionFactory {
    /// Holds `create_offer`/`create_answer` until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Holds `apply_remote_description` until `gate` is notified.
    pub fn with_remote_gate(mut self, gate: Arc<Notify>) -> Self {
        self.remote_gate = Some(gate);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_remote(mut self) -> Self {
        self.fail_remote = true;
        self
    }

    /// Emits a local stream as soon as the session exists.
    pub fn with_local_stream(mut self) -> Self {
        self.local_stream = true;
        self
    }

    /// Candidates "gathered" as soon as the session exists.
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeSession> {
        self.sessions()
            .pop()
            .expect("no session has been created yet")
    }
}

impl SessionFactory for FakeSessionFactory {
    fn create_session(
        &self,
    ) -> Result<
        (
            Arc<dyn ConnectivitySession>,
            mpsc::UnboundedReceiver<SessionEvent>,
        ),
        anyhow::Error,
    > {
        if self.fail_create {
            return Err(anyhow!("camera unavailable"));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(FakeSession {
            label: format!("session-{n}"),
            events: tx,
            log: Mutex::default(),
            gate: self.gate.clone(),
            remote_gate: self.remote_gate.clone(),
            fail_remote: self.fail_remote,
        });

        if self.local_stream {
            session.emit(SessionEvent::LocalStream(MediaStream::new(format!(
                "{}-camera",
                session.label
            ))));
        }
        for candidate in &self.candidates {
            session.emit(SessionEvent::LocalCandidate(candidate.clone()));
        }

        self.sessions.lock().unwrap().push(session.clone());
        Ok((session as Arc<dyn ConnectivitySession>, rx))
    }
}

/// Subscribes to `manager` and returns the events it dispatches.
pub fn event_channel(manager: &CallManager) -> mpsc::UnboundedReceiver<CallEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.add_handler(Arc::new(move |event: &CallEvent| {
        let _ = tx.send(event.clone());
    }));
    rx
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<CallEvent>) -> CallEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a call event")
        .expect("event channel closed")
}

/// Panics if an event shows up within a short quiet period.
pub async fn assert_no_event(events: &mut mpsc::UnboundedReceiver<CallEvent>) {
    if let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, events.recv()).await {
        panic!("unexpected call event: {event:?}");
    }
}

/// Polls `condition` until it holds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// A connected peer on a [`MemoryRelay`], with its sessions and events.
pub struct TestPeer {
    pub id: PeerId,
    pub manager: Arc<CallManager>,
    pub sessions: Arc<FakeSessionFactory>,
    pub events: mpsc::UnboundedReceiver<CallEvent>,
}

impl TestPeer {
    pub async fn connect(relay: &Arc<MemoryRelay>, sessions: FakeSessionFactory) -> Self {
        let sessions = Arc::new(sessions);
        let manager = CallManager::new(relay.clone(), sessions.clone());
        let mut events = event_channel(&manager);
        manager.connect().await.expect("connect should succeed");

        let id = match next_event(&mut events).await {
            CallEvent::IdObtained(id) => id,
            other => panic!("expected IdObtained, got {other:?}"),
        };
        Self {
            id,
            manager,
            sessions,
            events,
        }
    }

    pub async fn next_event(&mut self) -> CallEvent {
        next_event(&mut self.events).await
    }

    pub async fn assert_no_event(&mut self) {
        assert_no_event(&mut self.events).await;
    }

    /// Checks that the call data matches the status.
    pub async fn assert_consistent(&self) {
        let snapshot = self.manager.snapshot().await;
        assert!(snapshot.is_consistent(), "inconsistent call: {snapshot:?}");
    }
}
