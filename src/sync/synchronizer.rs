use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::composer::Composer;
use crate::config::SyncConfig;
use crate::errors::{ChatError, TransportError};
use crate::models::{CallerRole, Draft, Message, Partner, ThreadAddress};
use crate::partners::Addressing;
use crate::sync::scroll::{ScrollAnchor, ScrollDirective, Viewport};
use crate::sync::thread::ThreadState;
use crate::transport::{SessionProvider, ThreadTransport};

/// Lifecycle of the poll loop for the active partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    /// Waiting for the first successful fetch of a newly selected partner.
    Loading,
    Polling,
    /// Last fetch failed; the loop keeps running and retries on the next tick.
    Failing,
    /// Credentials were rejected; the loop is halted.
    Expired,
}

/// A new rendering of the active thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadUpdate {
    pub partner_id: String,
    pub messages: Vec<Message>,
    /// Whether a fetch brought ids that were not there before. Local changes
    /// (echo appended, confirmed or failed) never count as new.
    pub has_new: bool,
    pub scroll: ScrollDirective,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    PhaseChanged(SyncPhase),
    ThreadUpdated(ThreadUpdate),
    FetchFailed { partner_id: String, error: ChatError },
    /// The draft is handed back so it can be resubmitted without retyping.
    SendFailed { partner_id: Option<String>, draft: Draft, error: ChatError },
    SessionExpired,
}

enum Command {
    Select { epoch: u64, partner: Partner },
    Clear { epoch: u64 },
    Scrolled { epoch: u64, viewport: Viewport },
    Layout { epoch: u64, viewport: Viewport },
    Send { draft: Draft },
    Shutdown,
}

/// Entry point of the conversation engine.
pub struct ConversationSync;

impl ConversationSync {
    /// Starts the engine on the current tokio runtime.
    ///
    /// The engine stops on `shutdown()` or once every handle is dropped.
    pub fn spawn(
        config: SyncConfig,
        role: CallerRole,
        addressing: Addressing,
        transport: Arc<dyn ThreadTransport>,
        session: Arc<dyn SessionProvider>,
    ) -> (ConversationHandle, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let composer = Composer::new(role, config.max_text_length);

        let actor = SyncActor {
            config,
            addressing,
            composer: composer.clone(),
            transport,
            session,
            commands: command_rx,
            outbox: Outbox { events: event_tx, phase: SyncPhase::Idle },
            active: None,
            latest_epoch: 0,
            timer: None,
            in_flight: None,
            sends: FuturesUnordered::new(),
            anchor: ScrollAnchor::new(config.follow_threshold, config.scroll_settle),
        };
        tokio::spawn(actor.run());

        let handle = ConversationHandle {
            commands: command_tx,
            activation: Arc::new(AtomicU64::new(0)),
            composer,
        };
        (handle, event_rx)
    }
}

/// Caller-side control of a running engine.
#[derive(Clone)]
pub struct ConversationHandle {
    commands: mpsc::UnboundedSender<Command>,
    activation: Arc<AtomicU64>,
    composer: Composer,
}

impl ConversationHandle {
    /// Makes `partner` the active thread, dropping whatever was active before.
    ///
    /// The returned observer feeds scroll events for this activation only.
    pub fn select_partner(&self, partner: Partner) -> Result<ScrollObserver, ChatError> {
        let epoch = self.activation.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatch(Command::Select { epoch, partner })?;
        Ok(ScrollObserver {
            epoch,
            activation: self.activation.clone(),
            commands: self.commands.downgrade(),
        })
    }

    pub fn clear_partner(&self) -> Result<(), ChatError> {
        let epoch = self.activation.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatch(Command::Clear { epoch })
    }

    /// Validates the draft and queues it for sending to the active partner.
    pub fn send(&self, draft: Draft) -> Result<(), ChatError> {
        self.composer.validate(&draft)?;
        self.dispatch(Command::Send { draft })
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn dispatch(&self, command: Command) -> Result<(), ChatError> {
        self.commands.send(command).map_err(|_| ChatError::EngineStopped)
    }
}

/// Scroll listener bound to one partner activation.
///
/// Reports are dropped once another partner is selected, the partner is
/// cleared, or the engine stops.
pub struct ScrollObserver {
    epoch: u64,
    activation: Arc<AtomicU64>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl ScrollObserver {
    pub fn is_active(&self) -> bool {
        self.activation.load(Ordering::SeqCst) == self.epoch && self.commands.upgrade().is_some()
    }

    /// The reader moved the list.
    pub fn user_scrolled(&self, viewport: Viewport) {
        self.report(Command::Scrolled { epoch: self.epoch, viewport });
    }

    /// The list was measured again without user input.
    pub fn layout_changed(&self, viewport: Viewport) {
        self.report(Command::Layout { epoch: self.epoch, viewport });
    }

    fn report(&self, command: Command) {
        if self.activation.load(Ordering::SeqCst) != self.epoch {
            return;
        }
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(command);
        }
    }
}

struct ActiveThread {
    epoch: u64,
    partner: Partner,
    address: ThreadAddress,
    thread: ThreadState,
    /// Bumped whenever a send starts or settles. A fetch issued under an older
    /// generation cannot reflect that send and is not reconciled.
    generation: u64,
}

struct InFlight {
    epoch: u64,
    generation: u64,
    fetch: BoxFuture<'static, Result<Vec<Message>, TransportError>>,
}

struct SendOutcome {
    epoch: u64,
    partner_id: String,
    local_id: String,
    draft: Draft,
    result: Result<Message, TransportError>,
}

struct Outbox {
    events: mpsc::UnboundedSender<ConversationEvent>,
    phase: SyncPhase,
}

impl Outbox {
    fn emit(&self, event: ConversationEvent) {
        if self.events.send(event).is_err() {
            debug!("Conversation event dropped, no receiver");
        }
    }

    fn set_phase(&mut self, phase: SyncPhase) {
        if self.phase != phase {
            debug!("Sync phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.emit(ConversationEvent::PhaseChanged(phase));
        }
    }

    fn update(&self, active: &ActiveThread, has_new: bool, scroll: ScrollDirective) {
        self.emit(ConversationEvent::ThreadUpdated(ThreadUpdate {
            partner_id: active.partner.id.clone(),
            messages: active.thread.messages().to_vec(),
            has_new,
            scroll,
        }));
    }
}

/// Single logical thread owning all conversation state. Commands, timer ticks,
/// fetch completions and send completions are applied one at a time.
struct SyncActor {
    config: SyncConfig,
    addressing: Addressing,
    composer: Composer,
    transport: Arc<dyn ThreadTransport>,
    session: Arc<dyn SessionProvider>,
    commands: mpsc::UnboundedReceiver<Command>,
    outbox: Outbox,
    active: Option<ActiveThread>,
    latest_epoch: u64,
    timer: Option<Interval>,
    /// Single slot: a tick never queues a second fetch behind this one.
    in_flight: Option<InFlight>,
    sends: FuturesUnordered<BoxFuture<'static, SendOutcome>>,
    anchor: ScrollAnchor,
}

impl SyncActor {
    async fn run(mut self) {
        debug!("Conversation sync started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = next_tick(&mut self.timer) => self.on_tick(),
                (stamp, result) = next_fetch(&mut self.in_flight) => self.on_fetched(stamp, result),
                Some(outcome) = self.sends.next(), if !self.sends.is_empty() => self.on_sent(outcome),
            }
        }
        self.deactivate();
        info!("Conversation sync stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Select { epoch, partner } => self.select(epoch, partner),
            Command::Clear { epoch } => self.clear(epoch),
            Command::Scrolled { epoch, viewport } => {
                if self.is_current(epoch) {
                    self.anchor.on_user_scroll(viewport);
                }
            }
            Command::Layout { epoch, viewport } => {
                if self.is_current(epoch) {
                    self.anchor.observe_layout(viewport);
                }
            }
            Command::Send { draft } => self.send(draft),
            Command::Shutdown => {}
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.epoch == epoch)
    }

    fn is_expired(&self) -> bool {
        self.outbox.phase == SyncPhase::Expired
    }

    fn select(&mut self, epoch: u64, partner: Partner) {
        if self.is_expired() {
            warn!("Session expired, not opening conversation with {}", partner.id);
            return;
        }
        if epoch < self.latest_epoch {
            debug!("Ignoring out-of-order selection of {}", partner.id);
            return;
        }
        self.latest_epoch = epoch;
        self.deactivate();

        info!("Active partner is now {} ({})", partner.display_name, partner.id);
        let address = self.addressing.thread_address(&partner);
        self.anchor.reset();
        self.active = Some(ActiveThread { epoch, partner, address, thread: ThreadState::new(), generation: 0 });
        self.outbox.set_phase(SyncPhase::Loading);
        self.start_fetch();

        let period = self.config.poll_interval;
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);
    }

    fn clear(&mut self, epoch: u64) {
        if epoch < self.latest_epoch {
            return;
        }
        self.latest_epoch = epoch;
        if let Some(active) = &self.active {
            info!("Conversation with {} closed", active.partner.id);
        }
        self.deactivate();
        if !self.is_expired() {
            self.outbox.set_phase(SyncPhase::Idle);
        }
    }

    /// Releases the timer and cancels the outstanding fetch of the active partner.
    fn deactivate(&mut self) {
        self.timer = None;
        if self.in_flight.take().is_some() {
            debug!("Cancelled outstanding fetch");
        }
        self.active = None;
    }

    fn on_tick(&mut self) {
        if self.in_flight.is_some() {
            debug!("Previous fetch still outstanding, skipping tick");
            return;
        }
        self.start_fetch();
    }

    fn start_fetch(&mut self) {
        let Some(active) = &self.active else { return };
        let transport = self.transport.clone();
        let address = active.address.clone();
        self.in_flight = Some(InFlight {
            epoch: active.epoch,
            generation: active.generation,
            fetch: Box::pin(async move { transport.fetch_thread(&address).await }),
        });
    }

    fn on_fetched(&mut self, (epoch, generation): (u64, u64), result: Result<Vec<Message>, TransportError>) {
        if !self.is_current(epoch) {
            debug!("Discarding fetch result of an inactive partner");
            return;
        }

        match result {
            Ok(messages) => {
                let Some(active) = self.active.as_mut() else { return };
                if generation != active.generation {
                    debug!("Fetch for {} predates a send, fetching again", active.partner.id);
                    self.start_fetch();
                    return;
                }
                let first_load = active.thread.awaiting_first_load();
                let has_new = active.thread.reconcile(messages, self.addressing.own_identity());
                let scroll = self.anchor.route(first_load, has_new);
                if has_new {
                    debug!("{} now has {} messages", active.partner.id, active.thread.messages().len());
                }
                self.outbox.update(active, has_new, scroll);
                self.outbox.set_phase(SyncPhase::Polling);
            }
            Err(TransportError::Unauthorized) => self.expire(),
            Err(e) => {
                let Some(active) = &self.active else { return };
                warn!("Refreshing thread with {} failed: {e}", active.partner.id);
                let error = ChatError::fetch(active.partner.id.clone(), e);
                self.outbox.emit(ConversationEvent::FetchFailed {
                    partner_id: active.partner.id.clone(),
                    error,
                });
                self.outbox.set_phase(SyncPhase::Failing);
            }
        }
    }

    fn send(&mut self, draft: Draft) {
        if self.is_expired() {
            self.outbox.emit(ConversationEvent::SendFailed {
                partner_id: self.active.as_ref().map(|a| a.partner.id.clone()),
                draft,
                error: ChatError::AuthExpired,
            });
            return;
        }
        let Some(active) = self.active.as_mut() else {
            self.outbox.emit(ConversationEvent::SendFailed {
                partner_id: None,
                draft,
                error: ChatError::NoActivePartner,
            });
            return;
        };

        let outgoing = match self.composer.compose(&draft, &active.address) {
            Ok(outgoing) => outgoing,
            Err(error) => {
                self.outbox.emit(ConversationEvent::SendFailed {
                    partner_id: Some(active.partner.id.clone()),
                    draft,
                    error,
                });
                return;
            }
        };

        let echo = self.composer.echo(&outgoing, self.addressing.own_identity());
        let local_id = echo.id.clone();
        active.thread.push_echo(echo);
        active.generation += 1;
        let scroll = self.anchor.on_send();
        self.outbox.update(active, false, scroll);

        debug!("Sending {} message to {}", outgoing.kind, active.partner.id);
        let transport = self.transport.clone();
        let address = active.address.clone();
        let epoch = active.epoch;
        let partner_id = active.partner.id.clone();
        self.sends.push(Box::pin(async move {
            let result = transport.send_message(&address, &outgoing).await;
            SendOutcome { epoch, partner_id, local_id, draft, result }
        }));
    }

    fn on_sent(&mut self, outcome: SendOutcome) {
        let SendOutcome { epoch, partner_id, local_id, draft, result } = outcome;
        let mut current = self.active.as_mut().filter(|a| a.epoch == epoch);
        if let Some(active) = current.as_deref_mut() {
            active.generation += 1;
        }

        match result {
            Ok(message) => {
                debug!("Message {} confirmed as {}", local_id, message.id);
                if let Some(active) = current {
                    if active.thread.confirm_echo(&local_id, message) {
                        self.outbox.update(active, false, ScrollDirective::Hold);
                    }
                }
            }
            Err(e) => {
                error!("Sending message to {partner_id} failed: {e}");
                let error = ChatError::send(e);
                if let Some(active) = current {
                    if active.thread.fail_echo(&local_id) {
                        self.outbox.update(active, false, ScrollDirective::Hold);
                    }
                }
                self.outbox.emit(ConversationEvent::SendFailed {
                    partner_id: Some(partner_id),
                    draft,
                    error: error.clone(),
                });
                if error.is_auth_expired() {
                    self.expire();
                }
            }
        }
    }

    /// Halts polling for good and hands control to the session.
    fn expire(&mut self) {
        if self.outbox.phase == SyncPhase::Expired {
            return;
        }
        error!("Authorization rejected, stopping conversation sync");
        self.timer = None;
        self.in_flight = None;
        self.session.force_logout();
        self.outbox.set_phase(SyncPhase::Expired);
        self.outbox.emit(ConversationEvent::SessionExpired);
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

/// Drives the in-flight fetch by reference so a losing `select!` branch does
/// not cancel it; the slot is emptied once it resolves.
async fn next_fetch(slot: &mut Option<InFlight>) -> ((u64, u64), Result<Vec<Message>, TransportError>) {
    let Some(in_flight) = slot.as_mut() else {
        return pending().await;
    };
    let result = in_flight.fetch.as_mut().await;
    let stamp = (in_flight.epoch, in_flight.generation);
    *slot = None;
    (stamp, result)
}
