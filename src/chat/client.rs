//! Chat client: one task that owns the conversation and its poll schedule.
//!
//! Commands from the front-end, dispatch results, and poll results are all
//! handled on the same task, one at a time. Dispatches and polls run as child
//! tasks and report back; at most one poll is in flight, so watermark updates
//! never interleave. Dropping the client aborts the task and its children.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::events::{ChatEvent, ConversationSnapshot, SubmitOutcome};
use crate::config::ChatConfig;
use crate::conversation::{Conversation, ConversationPhase, DispatchApplied, PollApplied};
use crate::error::{ClientError, DispatchError, RetrievalError};
use crate::messages::Message;
use crate::session::UserContext;
use crate::transport::{
    DispatchOutcome, HttpRetriever, MessageSink, MessageSource, PollSchedule, Poller,
    WebhookDispatcher,
};

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Reset {
        reply: oneshot::Sender<String>,
    },
    SetUser {
        user: Option<UserContext>,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<ConversationSnapshot>,
    },
    Shutdown,
}

struct DispatchDone {
    session_id: String,
    result: Result<DispatchOutcome, DispatchError>,
}

struct PollDone {
    session_id: String,
    result: Result<Vec<Message>, RetrievalError>,
}

/// Handle to a running chat client task.
pub struct ChatClient {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ChatEvent>,
    handle: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Build the HTTP dispatcher and retriever from `config` and start the client.
    pub fn from_config(config: &ChatConfig, user: Option<UserContext>) -> crate::error::Result<Self> {
        let sink: Arc<dyn MessageSink> = Arc::new(WebhookDispatcher::new(config)?);
        let source: Arc<dyn MessageSource> = Arc::new(HttpRetriever::new(config)?);
        Ok(Self::spawn(config, sink, source, user))
    }

    /// Start the client task with explicit transport.
    pub fn spawn(
        config: &ChatConfig,
        sink: Arc<dyn MessageSink>,
        source: Arc<dyn MessageSource>,
        user: Option<UserContext>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);

        let state = ChatLoop {
            conversation: Conversation::new(user, config.default_welcome()),
            sink,
            poller: Poller::new(source),
            schedule: PollSchedule::new(config.cadence, Instant::now()),
            dispatches: JoinSet::new(),
            dispatch_sessions: HashMap::new(),
            polls: JoinSet::new(),
            events: events.clone(),
        };

        let handle = tokio::spawn(state.run(rx));

        Self {
            commands,
            events,
            handle: Some(handle),
        }
    }

    /// Subscribe to conversation changes. Call [`snapshot`](Self::snapshot)
    /// for the state before the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Submit user text for dispatch.
    pub async fn submit(&self, text: impl Into<String>) -> Result<SubmitOutcome, ClientError> {
        let text = text.into();
        self.request(|reply| Command::Submit { text, reply }).await
    }

    /// Start a new conversation for the current user. Returns the new session id.
    pub async fn reset(&self) -> Result<String, ClientError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Tell the client who is signed in. Returns `true` if the session was replaced.
    pub async fn set_user(&self, user: Option<UserContext>) -> Result<bool, ClientError> {
        self.request(|reply| Command::SetUser { user, reply }).await
    }

    pub async fn snapshot(&self) -> Result<ConversationSnapshot, ClientError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Chat client task ended abnormally: {e}");
            }
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct ChatLoop {
    conversation: Conversation,
    sink: Arc<dyn MessageSink>,
    poller: Poller,
    schedule: PollSchedule,
    dispatches: JoinSet<DispatchDone>,
    /// Session each running dispatch was started for, by task id.
    dispatch_sessions: HashMap<task::Id, String>,
    polls: JoinSet<PollDone>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(
            session_id = %self.conversation.session().id(),
            dispatch_configured = self.sink.is_configured(),
            "Chat client started"
        );

        loop {
            let due = self.schedule.next_due();
            let poll_idle = self.polls.is_empty();

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(joined) = self.dispatches.join_next_with_id() => match joined {
                    Ok((id, done)) => {
                        self.dispatch_sessions.remove(&id);
                        self.handle_dispatch(done);
                    }
                    Err(e) => self.handle_dispatch_crash(e),
                },
                Some(joined) = self.polls.join_next() => match joined {
                    Ok(done) => self.handle_poll(done),
                    Err(e) => {
                        error!("Poll task failed: {e}");
                        self.schedule.completed(Instant::now());
                    }
                },
                _ = tokio::time::sleep_until(due), if poll_idle => self.start_poll(),
            }
        }

        self.dispatches.abort_all();
        self.dispatch_sessions.clear();
        self.polls.abort_all();
        info!(session_id = %self.conversation.session().id(), "Chat client stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { text, reply } => {
                let outcome = self.submit(&text);
                let _ = reply.send(outcome);
            }
            Command::Reset { reply } => {
                let user = self.conversation.user().cloned();
                let phase = self.conversation.phase();
                self.conversation.reset(user);
                self.session_replaced(phase);
                let _ = reply.send(self.conversation.session().id().to_string());
            }
            Command::SetUser { user, reply } => {
                let phase = self.conversation.phase();
                let replaced = self.conversation.set_user(user);
                if replaced {
                    self.session_replaced(phase);
                }
                let _ = reply.send(replaced);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn submit(&mut self, text: &str) -> SubmitOutcome {
        let before = self.conversation.log().len();
        let phase = self.conversation.phase();
        let now = Instant::now();

        let outbound = match self
            .conversation
            .submit(text, self.sink.is_configured(), now)
        {
            Ok(outbound) => outbound,
            Err(rejection) => return SubmitOutcome::Rejected(rejection),
        };

        let message_id = self
            .conversation
            .log()
            .last()
            .map(|m| m.id.clone())
            .unwrap_or_default();

        self.schedule.reanchor(now);

        let sink = Arc::clone(&self.sink);
        let session_id = outbound.session_id.clone();
        let dispatch = self.dispatches.spawn(async move {
            let result = sink.send(&outbound).await;
            DispatchDone {
                session_id: outbound.session_id,
                result,
            }
        });
        self.dispatch_sessions.insert(dispatch.id(), session_id);

        self.publish_changes(before, phase);
        SubmitOutcome::Submitted { message_id }
    }

    fn handle_dispatch(&mut self, done: DispatchDone) {
        let before = self.conversation.log().len();
        let phase = self.conversation.phase();

        match self
            .conversation
            .dispatch_finished(&done.session_id, done.result)
        {
            DispatchApplied::Stale => {}
            DispatchApplied::Delivered | DispatchApplied::Failed | DispatchApplied::Skipped => {
                self.publish_changes(before, phase);
            }
        }
    }

    /// A dispatch task panicked. Treated as a failed dispatch for the session
    /// it was started for, so a crash in a replaced session changes nothing.
    fn handle_dispatch_crash(&mut self, e: JoinError) {
        error!("Dispatch task failed: {e}");
        let Some(session_id) = self.dispatch_sessions.remove(&e.id()) else {
            warn!(task_id = %e.id(), "Crashed dispatch has no recorded session");
            return;
        };
        self.handle_dispatch(DispatchDone {
            session_id,
            result: Err(DispatchError::Network(format!("dispatch task failed: {e}"))),
        });
    }

    fn start_poll(&mut self) {
        let session = self.conversation.session().clone();
        let poller = self.poller.clone();
        debug!(session_id = %session.id(), since = %session.watermark(), "Polling for replies");

        self.polls.spawn(async move {
            let result = poller.poll(&session).await;
            PollDone {
                session_id: session.id().to_string(),
                result,
            }
        });
    }

    fn handle_poll(&mut self, done: PollDone) {
        self.schedule.completed(Instant::now());

        let messages = match done.result {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id = %done.session_id, error = %e, "Error polling for replies");
                return;
            }
        };

        let before = self.conversation.log().len();
        let phase = self.conversation.phase();

        match self
            .conversation
            .apply_poll(&done.session_id, messages, Utc::now(), Instant::now())
        {
            PollApplied::Accepted { count } => {
                debug!(session_id = %done.session_id, count, "Merged replies");
                self.publish_changes(before, phase);
            }
            PollApplied::Unchanged | PollApplied::Stale => {}
        }
    }

    fn session_replaced(&mut self, previous_phase: ConversationPhase) {
        self.schedule.reanchor(Instant::now());

        let session_id = self.conversation.session().id().to_string();
        let messages = self.conversation.log().as_slice().to_vec();
        let _ = self.events.send(ChatEvent::SessionStarted {
            session_id,
            messages,
        });
        self.publish_phase(previous_phase);
    }

    /// Broadcast messages appended after `before` and any phase change.
    /// Ok if no subscribers are listening.
    fn publish_changes(&self, before: usize, previous_phase: ConversationPhase) {
        for message in self.conversation.log().since(before) {
            let _ = self.events.send(ChatEvent::MessageAppended {
                message: message.clone(),
            });
        }
        self.publish_phase(previous_phase);
    }

    fn publish_phase(&self, previous_phase: ConversationPhase) {
        let phase = self.conversation.phase();
        if phase != previous_phase {
            let _ = self.events.send(ChatEvent::PhaseChanged { phase });
        }
    }

    fn snapshot(&self) -> ConversationSnapshot {
        let metrics = self.conversation.metrics();
        ConversationSnapshot {
            session: self.conversation.session().clone(),
            user: self.conversation.user().cloned(),
            phase: self.conversation.phase(),
            messages: self.conversation.log().as_slice().to_vec(),
            webhook_latency: metrics.webhook_latency,
            total_response_time: metrics.total_response_time,
            waiting_for: self.conversation.waiting_for(Instant::now()),
        }
    }
}
