use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

use marketplace_chat::models::{DeliveryState, OutgoingMessage, ThreadAddress};
use marketplace_chat::{
    Addressing, CallerRole, ChatError, ConversationEvent, ConversationHandle, ConversationSync, Draft,
    Message, Partner, PartnerRole, ScrollDirective, SessionProvider, SyncConfig, SyncPhase,
    ThreadTransport, ThreadUpdate, TransportError, Viewport,
};

// ── Test doubles ──────────────────────────────────────────────────────────────

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory server keyed by thread address key.
struct MockTransport {
    own_sender: String,
    threads: Mutex<HashMap<String, Vec<Message>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<String, VecDeque<TransportError>>>,
    send_failure: Mutex<Option<TransportError>>,
    fetches: Mutex<Vec<ThreadAddress>>,
    sends: Mutex<Vec<OutgoingMessage>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockTransport {
    fn new(own_sender: &str) -> Self {
        Self {
            own_sender: own_sender.to_string(),
            threads: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            send_failure: Mutex::new(None),
            fetches: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    fn with_thread(self, key: &str, ids: &[&str]) -> Self {
        let messages = ids.iter().map(|id| Message::text(*id, key, format!("from {key}"))).collect();
        self.threads.lock().unwrap().insert(key.to_string(), messages);
        self
    }

    fn with_delay(self, key: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
        self
    }

    fn fail_next_fetch(&self, key: &str, error: TransportError) {
        self.failures.lock().unwrap().entry(key.to_string()).or_default().push_back(error);
    }

    fn push_message(&self, key: &str, id: &str) {
        self.threads
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(Message::text(id, key, format!("from {key}")));
    }

    fn fetch_count(&self, key: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|a| a.key == key).count()
    }

    fn server_len(&self, key: &str) -> usize {
        self.threads.lock().unwrap().get(key).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl ThreadTransport for MockTransport {
    async fn fetch_thread(&self, address: &ThreadAddress) -> Result<Vec<Message>, TransportError> {
        self.fetches.lock().unwrap().push(address.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);
        // The server answers with the thread as it stood when the request arrived.
        let snapshot = self.threads.lock().unwrap().get(&address.key).cloned().unwrap_or_default();

        let delay = self.delays.lock().unwrap().get(&address.key).copied();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().get_mut(&address.key).and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(snapshot)
    }

    async fn send_message(
        &self,
        address: &ThreadAddress,
        message: &OutgoingMessage,
    ) -> Result<Message, TransportError> {
        self.sends.lock().unwrap().push(message.clone());
        let failure = self.send_failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = Message::text(id, self.own_sender.clone(), message.text.clone().unwrap_or_default());
        stored.kind = message.kind;
        stored.order_ref = message.order_ref.clone();
        stored.product_ref = message.product_ref.clone();
        self.threads
            .lock()
            .unwrap()
            .entry(address.key.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
struct TestSession {
    logged_out: AtomicBool,
}

#[async_trait]
impl SessionProvider for TestSession {
    fn credential(&self) -> Option<String> {
        Some("token".into())
    }

    async fn refresh(&self) -> Result<String, TransportError> {
        Err(TransportError::Unauthorized)
    }

    fn force_logout(&self) {
        self.logged_out.store(true, Ordering::SeqCst);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn supplier(id: &str) -> Partner {
    Partner::new(id, format!("Supplier {id}"), PartnerRole::Supplier)
}

fn consumer_engine(
    transport: Arc<MockTransport>,
    session: Arc<TestSession>,
) -> (ConversationHandle, UnboundedReceiver<ConversationEvent>) {
    ConversationSync::spawn(
        SyncConfig::default(),
        CallerRole::Consumer,
        Addressing::Direct { own_id: "me".into() },
        transport,
        session,
    )
}

fn drain(events: &mut UnboundedReceiver<ConversationEvent>) -> Vec<ConversationEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn updates(events: &[ConversationEvent]) -> Vec<&ThreadUpdate> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversationEvent::ThreadUpdated(update) => Some(update),
            _ => None,
        })
        .collect()
}

fn ids(update: &ThreadUpdate) -> Vec<&str> {
    update.messages.iter().map(|m| m.id.as_str()).collect()
}

fn settle() -> ScrollDirective {
    ScrollDirective::ToBottom { settle: SyncConfig::default().scroll_settle }
}

const TICK: Duration = Duration::from_secs(3);

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn initial_load_scrolls_and_identical_poll_does_not() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1", "a2", "a3"]));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;

    let first = drain(&mut events);
    assert_eq!(first[0], ConversationEvent::PhaseChanged(SyncPhase::Loading));
    let first_updates = updates(&first);
    assert_eq!(first_updates.len(), 1);
    assert_eq!(ids(first_updates[0]), ["a1", "a2", "a3"]);
    assert!(first_updates[0].has_new);
    assert_eq!(first_updates[0].scroll, settle());
    assert!(first.contains(&ConversationEvent::PhaseChanged(SyncPhase::Polling)));

    sleep(TICK).await;

    let second = drain(&mut events);
    let second_updates = updates(&second);
    assert_eq!(second_updates.len(), 1);
    assert!(!second_updates[0].has_new);
    assert_eq!(second_updates[0].scroll, ScrollDirective::Hold);
    assert_eq!(transport.fetch_count("A"), 2);
}

#[tokio::test(start_paused = true)]
async fn switching_partners_discards_the_previous_thread() {
    let transport = Arc::new(
        MockTransport::new("me")
            .with_thread("A", &["a1"])
            .with_delay("A", Duration::from_secs(5))
            .with_thread("B", &["b1", "b2"]),
    );
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    let observer_a = handle.select_partner(supplier("A")).unwrap();
    let observer_b = handle.select_partner(supplier("B")).unwrap();
    assert!(!observer_a.is_active());
    assert!(observer_b.is_active());

    sleep(Duration::from_secs(10)).await;

    let all = drain(&mut events);
    let rendered = updates(&all);
    assert!(!rendered.is_empty());
    for update in &rendered {
        assert_eq!(update.partner_id, "B");
        assert!(update.messages.iter().all(|m| m.id.starts_with('b')));
    }
    // A's fetch may have started, but its timer never fired again.
    assert!(transport.fetch_count("A") <= 1);
    assert_eq!(transport.fetch_count("B"), 4);
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_are_skipped_not_queued() {
    let transport = Arc::new(
        MockTransport::new("me")
            .with_thread("A", &["a1"])
            .with_delay("A", Duration::from_secs(7)),
    );
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();

    // Ticks at 3s and 6s land while the first fetch is still outstanding.
    sleep(Duration::from_secs(8)).await;
    assert_eq!(transport.fetch_count("A"), 1);
    assert_eq!(updates(&drain(&mut events)).len(), 1);

    // The 9s tick finds the slot free again.
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(transport.fetch_count("A"), 2);
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn authorization_failure_forces_logout_and_stops_polling() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    transport.fail_next_fetch("A", TransportError::Unauthorized);
    let session = Arc::new(TestSession::default());
    let (handle, mut events) = consumer_engine(transport.clone(), session.clone());

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_secs(30)).await;

    let all = drain(&mut events);
    assert!(all.contains(&ConversationEvent::SessionExpired));
    assert!(all.contains(&ConversationEvent::PhaseChanged(SyncPhase::Expired)));
    assert!(updates(&all).is_empty());
    assert!(session.logged_out.load(Ordering::SeqCst));
    assert_eq!(transport.fetch_count("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_keeps_thread_and_keeps_polling() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    drain(&mut events);

    transport.fail_next_fetch("A", TransportError::Network("connection reset".into()));
    sleep(TICK).await;

    let failed = drain(&mut events);
    assert!(updates(&failed).is_empty(), "last good thread stays rendered");
    assert!(failed.iter().any(|e| matches!(
        e,
        ConversationEvent::FetchFailed { partner_id, error: ChatError::TransientFetch { .. } } if partner_id == "A"
    )));
    assert!(failed.contains(&ConversationEvent::PhaseChanged(SyncPhase::Failing)));

    transport.push_message("A", "a2");
    sleep(TICK).await;

    let recovered = drain(&mut events);
    let recovered_updates = updates(&recovered);
    assert_eq!(recovered_updates.len(), 1);
    assert_eq!(ids(recovered_updates[0]), ["a1", "a2"]);
    assert!(recovered_updates[0].has_new);
    assert!(recovered.contains(&ConversationEvent::PhaseChanged(SyncPhase::Polling)));
}

#[tokio::test(start_paused = true)]
async fn failed_initial_load_still_scrolls_on_first_success() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1", "a2"]));
    transport.fail_next_fetch("A", TransportError::Server { status: 503, message: "busy".into() });
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    let observer = handle.select_partner(supplier("A")).unwrap();
    observer.layout_changed(Viewport::new(0.0, 400.0, 3_000.0));
    sleep(Duration::from_millis(10)).await;
    assert!(updates(&drain(&mut events)).is_empty());

    sleep(TICK).await;
    let all = drain(&mut events);
    let rendered = updates(&all);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].has_new);
    assert_eq!(rendered[0].scroll, settle());
}

#[tokio::test(start_paused = true)]
async fn reader_scrolled_up_is_not_pulled_down() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1", "a2", "a3"]));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    let observer = handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    drain(&mut events);

    observer.user_scrolled(Viewport::new(0.0, 500.0, 2_000.0));
    transport.push_message("A", "a4");
    sleep(TICK).await;

    let held = drain(&mut events);
    let held_updates = updates(&held);
    assert_eq!(held_updates.len(), 1);
    assert!(held_updates[0].has_new);
    assert_eq!(held_updates[0].scroll, ScrollDirective::Hold);

    observer.user_scrolled(Viewport::new(1_480.0, 500.0, 2_000.0));
    transport.push_message("A", "a5");
    sleep(TICK).await;

    let followed = drain(&mut events);
    assert_eq!(updates(&followed)[0].scroll, settle());
}

#[tokio::test(start_paused = true)]
async fn send_echoes_once_and_next_poll_matches_server() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1", "a2"]));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    let observer = handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    drain(&mut events);

    observer.user_scrolled(Viewport::new(0.0, 500.0, 2_000.0));
    handle.send(Draft::text("hello")).unwrap();
    sleep(Duration::from_millis(10)).await;

    let sent = drain(&mut events);
    let sent_updates = updates(&sent);
    let echo_update = sent_updates[0];
    assert_eq!(echo_update.messages.len(), 3);
    let echo = echo_update.messages.last().unwrap();
    assert!(echo.is_own);
    assert_eq!(echo.delivery, DeliveryState::Pending);
    assert_eq!(echo_update.scroll, settle(), "sending overrides the reader's position");

    sleep(TICK).await;

    let polled = drain(&mut events);
    let latest = updates(&polled).pop().unwrap().clone();
    assert_eq!(latest.messages.len(), transport.server_len("A"));
    assert_eq!(latest.messages.len(), 3);
    let hellos: Vec<_> = latest.messages.iter().filter(|m| m.text.as_deref() == Some("hello")).collect();
    assert_eq!(hellos.len(), 1);
    assert!(hellos[0].is_own);
    assert!(hellos[0].id.starts_with("srv-"));
}

#[tokio::test(start_paused = true)]
async fn failed_send_marks_echo_and_returns_draft() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    *transport.send_failure.lock().unwrap() =
        Some(TransportError::Server { status: 500, message: "boom".into() });
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    drain(&mut events);

    let draft = Draft::text("will fail").with_receipt("order-9");
    handle.send(draft.clone()).unwrap();
    sleep(Duration::from_millis(10)).await;

    let all = drain(&mut events);
    let last = updates(&all).pop().unwrap().clone();
    assert_eq!(last.messages.last().unwrap().delivery, DeliveryState::Failed);
    assert!(all.iter().any(|e| matches!(
        e,
        ConversationEvent::SendFailed { draft: returned, error: ChatError::SendFailure { .. }, .. }
            if *returned == draft
    )));
}

#[tokio::test(start_paused = true)]
async fn empty_draft_never_reaches_the_transport() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    let (handle, _events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();
    assert_eq!(handle.send(Draft::text("   ")), Err(ChatError::EmptyMessage));
    assert_eq!(
        handle.send(Draft::text("hi").with_product("p1")),
        Err(ChatError::ProductRefNotAllowed)
    );
    sleep(Duration::from_millis(10)).await;

    assert!(transport.sends.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_without_partner_hands_draft_back() {
    let transport = Arc::new(MockTransport::new("me"));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.send(Draft::text("anyone?")).unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(
        drain(&mut events),
        vec![ConversationEvent::SendFailed {
            partner_id: None,
            draft: Draft::text("anyone?"),
            error: ChatError::NoActivePartner,
        }]
    );
    assert!(transport.sends.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn staff_address_threads_through_the_organization() {
    let transport = Arc::new(MockTransport::new("org-1"));
    transport.push_message("org-1", "m1");
    let (handle, mut events) = ConversationSync::spawn(
        SyncConfig::default(),
        CallerRole::SupplierStaff,
        Addressing::Organization { organization_id: "org-1".into(), staff_id: "staff-7".into() },
        transport.clone(),
        Arc::new(TestSession::default()),
    );

    handle
        .select_partner(Partner::new("c1", "Consumer", PartnerRole::Consumer))
        .unwrap();
    handle.send(Draft::default().with_product("p-5")).unwrap();
    sleep(Duration::from_millis(10)).await;

    let fetched = transport.fetches.lock().unwrap()[0].clone();
    assert_eq!(fetched, ThreadAddress { key: "org-1".into(), counterpart_id: Some("c1".into()) });
    let sent = transport.sends.lock().unwrap()[0].clone();
    assert_eq!(sent.counterpart_id.as_deref(), Some("c1"));
    assert_eq!(sent.product_ref.as_deref(), Some("p-5"));

    // Messages stamped with the organization identity belong to the caller.
    let all = drain(&mut events);
    let fetched_own = updates(&all)
        .into_iter()
        .flat_map(|u| u.messages.iter())
        .find(|m| m.id == "m1")
        .cloned()
        .unwrap();
    assert!(fetched_own.is_own);
}

#[tokio::test(start_paused = true)]
async fn clearing_or_dropping_stops_the_poll_loop() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    let observer = handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    handle.clear_partner().unwrap();
    sleep(Duration::from_secs(10)).await;

    assert!(!observer.is_active());
    assert_eq!(transport.fetch_count("A"), 1);
    assert_eq!(drain(&mut events).last(), Some(&ConversationEvent::PhaseChanged(SyncPhase::Idle)));

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.fetch_count("A"), 2);

    drop(handle);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.fetch_count("A"), 2);
}

#[tokio::test(start_paused = true)]
async fn expired_session_rejects_sends_and_selections() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    transport.fail_next_fetch("A", TransportError::Unauthorized);
    let session = Arc::new(TestSession::default());
    let (handle, mut events) = consumer_engine(transport.clone(), session.clone());

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(drain(&mut events).contains(&ConversationEvent::SessionExpired));

    handle.send(Draft::text("after logout")).unwrap();
    handle.select_partner(supplier("A")).unwrap();
    handle.clear_partner().unwrap();
    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_secs(15)).await;

    let after = drain(&mut events);
    assert_eq!(
        after,
        vec![ConversationEvent::SendFailed {
            partner_id: Some("A".into()),
            draft: Draft::text("after logout"),
            error: ChatError::AuthExpired,
        }]
    );
    assert!(transport.sends.lock().unwrap().is_empty());
    assert_eq!(transport.fetch_count("A"), 1);
    assert!(session.logged_out.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn poll_issued_before_a_send_does_not_erase_it() {
    let transport = Arc::new(
        MockTransport::new("me")
            .with_thread("A", &["a1"])
            .with_delay("A", Duration::from_millis(500)),
    );
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_secs(1)).await;
    drain(&mut events);

    // The 3s tick fetch is outstanding until 3.5s.
    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(transport.fetch_count("A"), 2);
    handle.send(Draft::text("hello")).unwrap();
    sleep(Duration::from_secs(1)).await;

    let all = drain(&mut events);
    let rendered = updates(&all);
    assert!(rendered.len() >= 3);
    for update in &rendered {
        assert_eq!(ids(update).len(), 2, "every rendering keeps the sent message: {:?}", ids(update));
    }
    let last = rendered.last().unwrap();
    assert_eq!(ids(last), ["a1", "srv-1"]);
    // The stale tick result was replaced by an immediate fetch.
    assert_eq!(transport.fetch_count("A"), 3);
}

#[tokio::test(start_paused = true)]
async fn confirmation_replaces_echo_before_next_poll() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    let (handle, mut events) = consumer_engine(transport.clone(), Arc::new(TestSession::default()));

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    drain(&mut events);

    handle.send(Draft::text("hello")).unwrap();
    sleep(Duration::from_millis(10)).await;

    let all = drain(&mut events);
    let rendered = updates(&all);
    assert_eq!(rendered.len(), 2);
    let echo_id = rendered[0].messages[1].id.clone();
    assert!(echo_id.starts_with("local-"));

    let confirmed = rendered[1];
    assert_eq!(ids(confirmed), ["a1", "srv-1"]);
    assert!(!confirmed.has_new);
    assert_eq!(confirmed.scroll, ScrollDirective::Hold);
    assert_eq!(confirmed.messages[1].delivery, DeliveryState::Confirmed);
    assert!(confirmed.messages[1].is_own);
    assert_eq!(transport.fetch_count("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_send_fails_echo_and_expires_session() {
    let transport = Arc::new(MockTransport::new("me").with_thread("A", &["a1"]));
    *transport.send_failure.lock().unwrap() = Some(TransportError::Unauthorized);
    let session = Arc::new(TestSession::default());
    let (handle, mut events) = consumer_engine(transport.clone(), session.clone());

    handle.select_partner(supplier("A")).unwrap();
    sleep(Duration::from_millis(10)).await;
    drain(&mut events);

    handle.send(Draft::text("hello")).unwrap();
    sleep(Duration::from_secs(10)).await;

    let all = drain(&mut events);
    let last = updates(&all).pop().unwrap().clone();
    assert_eq!(last.messages.last().unwrap().delivery, DeliveryState::Failed);
    assert!(all.iter().any(|e| matches!(
        e,
        ConversationEvent::SendFailed { error: ChatError::AuthExpired, draft, .. } if *draft == Draft::text("hello")
    )));
    assert!(all.contains(&ConversationEvent::PhaseChanged(SyncPhase::Expired)));
    assert!(all.contains(&ConversationEvent::SessionExpired));
    assert!(session.logged_out.load(Ordering::SeqCst));
    assert_eq!(transport.fetch_count("A"), 1);
}
