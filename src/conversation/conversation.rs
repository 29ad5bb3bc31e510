//! The conversation: one live session, its message log, and the turn phase.
//!
//! Everything here is synchronous. The chat client task is the only owner, so
//! mutations are already serialized and nothing needs a lock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::metrics::PerformanceMetrics;
use super::phase::ConversationPhase;
use crate::error::DispatchError;
use crate::messages::{Message, MessageLog, Sender, merge};
use crate::session::{Session, SessionManager, UserContext};
use crate::transport::{DispatchOutcome, OutboundMessage};

/// Text appended as an assistant message when a dispatch fails.
pub const DISPATCH_ERROR_TEXT: &str =
    "Sorry, there was an error sending your message. Please try again.";

/// Id of the welcome message that opens every session.
pub const WELCOME_MESSAGE_ID: &str = "1";

/// Why a submission did not start a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Text was empty or whitespace.
    Blank,
    /// A reply is still outstanding.
    Busy,
    /// No webhook configured; nothing is sent and nothing changes.
    NotConfigured,
}

/// What a dispatch result did to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchApplied {
    /// Delivered; still waiting for the reply.
    Delivered,
    /// Failed; an error notice was appended and the phase released.
    Failed,
    /// Skipped by the sink; the phase was released.
    Skipped,
    /// The result belonged to a superseded session and was ignored.
    Stale,
}

/// What a poll result did to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollApplied {
    /// At least one new message was merged.
    Accepted { count: usize },
    /// Nothing new.
    Unchanged,
    /// The result belonged to a superseded session and was discarded.
    Stale,
}

/// Welcome text for a session.
pub fn welcome_text(user: Option<&UserContext>, default_welcome: &str) -> String {
    match user {
        Some(user) if !user.first_name.trim().is_empty() => {
            format!("Hey {}, what's the customer scoop?", user.display_name())
        }
        _ => default_welcome.to_string(),
    }
}

/// Client-side conversation state.
#[derive(Debug)]
pub struct Conversation {
    sessions: SessionManager,
    session: Session,
    user: Option<UserContext>,
    log: MessageLog,
    phase: ConversationPhase,
    metrics: PerformanceMetrics,
    default_welcome: String,
}

impl Conversation {
    /// Start a conversation with a fresh session.
    pub fn new(user: Option<UserContext>, default_welcome: impl Into<String>) -> Self {
        let mut sessions = SessionManager::new();
        let session = sessions.create_session(user.as_ref());
        let default_welcome = default_welcome.into();
        let log = Self::opening_log(&session, user.as_ref(), &default_welcome);

        info!(session_id = %session.id(), "Conversation started");

        Self {
            sessions,
            session,
            user,
            log,
            phase: ConversationPhase::Idle,
            metrics: PerformanceMetrics::default(),
            default_welcome,
        }
    }

    fn opening_log(session: &Session, user: Option<&UserContext>, default_welcome: &str) -> MessageLog {
        let mut log = MessageLog::new();
        log.push(Message::with_id(
            WELCOME_MESSAGE_ID,
            Sender::Ai,
            welcome_text(user, default_welcome),
            session.id(),
        ));
        log
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user(&self) -> Option<&UserContext> {
        self.user.as_ref()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    fn transition(&mut self, to: ConversationPhase, reason: &str) {
        if !self.phase.can_transition_to(to) {
            debug!(from = %self.phase, to = %to, reason, "Phase unchanged");
            return;
        }
        debug!(from = %self.phase, to = %to, reason, "Phase transition");
        self.phase = to;
    }

    /// Start a turn: append the local echo and enter `AwaitingReply`.
    ///
    /// Nothing changes unless the returned message is going to be dispatched.
    pub fn submit(
        &mut self,
        text: &str,
        dispatch_configured: bool,
        now: Instant,
    ) -> Result<OutboundMessage, Rejection> {
        if text.trim().is_empty() {
            return Err(Rejection::Blank);
        }
        if !self.phase.accepts_input() {
            debug!(session_id = %self.session.id(), "Submission while awaiting reply rejected");
            return Err(Rejection::Busy);
        }
        if !dispatch_configured {
            warn!("Webhook URL is not configured, message not sent");
            return Err(Rejection::NotConfigured);
        }

        let echo = Message::local(Sender::User, text, self.session.id());
        let outbound = OutboundMessage {
            session_id: self.session.id().to_string(),
            text: text.to_string(),
            sent_at: echo.timestamp,
            user: self.user.clone(),
        };

        self.log.push(echo);
        self.transition(ConversationPhase::AwaitingReply, "user submitted");
        self.metrics.start_clock(now);

        Ok(outbound)
    }

    /// Apply the result of a dispatch started by [`submit`](Self::submit).
    pub fn dispatch_finished(
        &mut self,
        session_id: &str,
        result: Result<DispatchOutcome, DispatchError>,
    ) -> DispatchApplied {
        if session_id != self.session.id() {
            debug!(session_id, current = %self.session.id(), "Ignoring dispatch result for old session");
            return DispatchApplied::Stale;
        }

        match result {
            Ok(DispatchOutcome::Delivered { latency }) => {
                self.metrics.record_webhook(latency);
                DispatchApplied::Delivered
            }
            Ok(DispatchOutcome::Skipped) => {
                self.metrics.cancel_clock();
                self.transition(ConversationPhase::Idle, "dispatch skipped");
                DispatchApplied::Skipped
            }
            Err(e) => {
                warn!(session_id, error = %e, "Error sending user message");
                self.log
                    .push(Message::local(Sender::Ai, DISPATCH_ERROR_TEXT, self.session.id()));
                self.metrics.cancel_clock();
                self.transition(ConversationPhase::Idle, "dispatch failed");
                DispatchApplied::Failed
            }
        }
    }

    /// Merge a poll result.
    ///
    /// On acceptance the phase returns to `Idle` and the watermark moves to
    /// `now` (client capture time, not the server's message timestamps).
    pub fn apply_poll(
        &mut self,
        session_id: &str,
        incoming: Vec<Message>,
        now: DateTime<Utc>,
        instant: Instant,
    ) -> PollApplied {
        if session_id != self.session.id() {
            debug!(session_id, current = %self.session.id(), "Discarding poll result for old session");
            return PollApplied::Stale;
        }

        let total = incoming.len();
        let current = self.session.id().to_string();
        let addressed: Vec<Message> = incoming
            .into_iter()
            .filter(|m| m.addressed_to(&current))
            .collect();
        if addressed.len() < total {
            warn!(
                session_id = %current,
                dropped = total - addressed.len(),
                "Dropped messages addressed to another session"
            );
        }

        let before = self.log.len();
        if !merge(&mut self.log, addressed) {
            return PollApplied::Unchanged;
        }
        let count = self.log.len() - before;

        self.transition(ConversationPhase::Idle, "reply received");
        self.session.advance_watermark(now);
        if let Some(total) = self.metrics.record_reply(instant) {
            info!(
                session_id = %current,
                total_secs = total.as_secs_f64(),
                "Complete response received"
            );
        }

        PollApplied::Accepted { count }
    }

    /// Discard the current session and start a fresh one.
    pub fn reset(&mut self, user: Option<UserContext>) {
        self.user = user;
        self.session = self.sessions.reset_session(&self.session, self.user.as_ref());
        self.log = Self::opening_log(&self.session, self.user.as_ref(), &self.default_welcome);
        self.phase = ConversationPhase::Idle;
        self.metrics.cancel_clock();
    }

    /// Update the signed-in user. Resets the session when the current one was
    /// not built for this user. Returns `true` if a reset happened.
    pub fn set_user(&mut self, user: Option<UserContext>) -> bool {
        let needs_reset = match (&user, &self.user) {
            (Some(next), _) => !self.session.belongs_to(next),
            (None, Some(_)) => true,
            (None, None) => false,
        };

        if needs_reset {
            self.reset(user);
        } else {
            self.user = user;
        }
        needs_reset
    }

    /// Time since the current turn was dispatched, if one is outstanding.
    pub fn waiting_for(&self, now: Instant) -> Option<Duration> {
        if !self.phase.is_thinking() {
            return None;
        }
        self.metrics
            .started_at()
            .map(|started| now.saturating_duration_since(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> UserContext {
        UserContext::new("ana", "17", "Estimator")
    }

    fn reply(id: &str, text: &str, session_id: &str) -> Message {
        Message::with_id(id, Sender::Ai, text, session_id)
    }

    fn conversation() -> Conversation {
        Conversation::new(Some(ana()), "Welcome!")
    }

    #[test]
    fn opens_with_personalized_welcome() {
        let conv = conversation();
        assert_eq!(conv.log().len(), 1);
        let welcome = &conv.log().as_slice()[0];
        assert_eq!(welcome.id, WELCOME_MESSAGE_ID);
        assert_eq!(welcome.sender, Sender::Ai);
        assert_eq!(welcome.text, "Hey Ana, what's the customer scoop?");
        assert_eq!(conv.phase(), ConversationPhase::Idle);
    }

    #[test]
    fn anonymous_conversation_uses_default_welcome() {
        let conv = Conversation::new(None, "Welcome to TradeSphere! How can I help you today?");
        assert_eq!(
            conv.log().as_slice()[0].text,
            "Welcome to TradeSphere! How can I help you today?"
        );
        assert!(conv.session().id().starts_with("quote_session_"));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_appends_local_echo_and_awaits_reply() {
        let mut conv = conversation();
        let outbound = conv.submit("hello", true, Instant::now()).unwrap();

        assert_eq!(outbound.text, "hello");
        assert_eq!(outbound.session_id, conv.session().id());
        assert_eq!(outbound.user, Some(ana()));

        let last = conv.log().last().unwrap();
        assert_eq!(last.sender, Sender::User);
        assert_eq!(last.text, "hello");
        assert_eq!(conv.phase(), ConversationPhase::AwaitingReply);
        assert!(conv.metrics().is_timing());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_and_busy_submissions_are_rejected() {
        let mut conv = conversation();
        assert_eq!(conv.submit("   ", true, Instant::now()).unwrap_err(), Rejection::Blank);

        conv.submit("hello", true, Instant::now()).unwrap();
        let len = conv.log().len();
        assert_eq!(conv.submit("hello", true, Instant::now()).unwrap_err(), Rejection::Busy);
        assert_eq!(conv.log().len(), len);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_dispatch_changes_nothing() {
        let mut conv = conversation();
        let err = conv.submit("hello", false, Instant::now()).unwrap_err();

        assert_eq!(err, Rejection::NotConfigured);
        assert_eq!(conv.log().len(), 1);
        assert_eq!(conv.phase(), ConversationPhase::Idle);
        assert!(!conv.metrics().is_timing());
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_reply_releases_phase_and_advances_watermark() {
        let mut conv = conversation();
        let start = Instant::now();
        conv.submit("hello", true, start).unwrap();
        let session_id = conv.session().id().to_string();
        let watermark = conv.session().watermark();

        let now = watermark + chrono::Duration::seconds(3);
        let applied = conv.apply_poll(
            &session_id,
            vec![reply("m1", "hi there", &session_id)],
            now,
            start + Duration::from_secs(3),
        );

        assert_eq!(applied, PollApplied::Accepted { count: 1 });
        let senders: Vec<Sender> = conv.log().iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::Ai, Sender::User, Sender::Ai]);
        assert_eq!(conv.phase(), ConversationPhase::Idle);
        assert_eq!(conv.session().watermark(), now);
        assert_eq!(conv.metrics().total_response_time, Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_delivery_is_absorbed() {
        let mut conv = conversation();
        conv.submit("hello", true, Instant::now()).unwrap();
        let session_id = conv.session().id().to_string();
        let batch = vec![reply("m1", "hi there", &session_id)];

        let first_at = conv.session().watermark() + chrono::Duration::seconds(1);
        conv.apply_poll(&session_id, batch.clone(), first_at, Instant::now());
        let len = conv.log().len();

        let second_at = first_at + chrono::Duration::seconds(1);
        let applied = conv.apply_poll(&session_id, batch, second_at, Instant::now());

        assert_eq!(applied, PollApplied::Unchanged);
        assert_eq!(conv.log().len(), len);
        // No acceptance, so the watermark stays where the first merge put it.
        assert_eq!(conv.session().watermark(), first_at);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_poll_leaves_watermark_alone() {
        let mut conv = conversation();
        let session_id = conv.session().id().to_string();
        let watermark = conv.session().watermark();

        let applied = conv.apply_poll(
            &session_id,
            Vec::new(),
            watermark + chrono::Duration::seconds(10),
            Instant::now(),
        );
        assert_eq!(applied, PollApplied::Unchanged);
        assert_eq!(conv.session().watermark(), watermark);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_failure_appends_notice_and_releases_phase() {
        let mut conv = conversation();
        conv.submit("hello", true, Instant::now()).unwrap();
        let session_id = conv.session().id().to_string();
        let watermark = conv.session().watermark();

        let applied = conv.dispatch_finished(
            &session_id,
            Err(DispatchError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        );

        assert_eq!(applied, DispatchApplied::Failed);
        let last = conv.log().last().unwrap();
        assert_eq!(last.sender, Sender::Ai);
        assert_eq!(last.text, DISPATCH_ERROR_TEXT);
        assert_eq!(conv.phase(), ConversationPhase::Idle);
        assert_eq!(conv.session().watermark(), watermark);

        // The user can retry immediately.
        assert!(conv.submit("hello again", true, Instant::now()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_dispatch_records_latency_and_keeps_waiting() {
        let mut conv = conversation();
        conv.submit("hello", true, Instant::now()).unwrap();
        let session_id = conv.session().id().to_string();

        let applied = conv.dispatch_finished(
            &session_id,
            Ok(DispatchOutcome::Delivered {
                latency: Duration::from_millis(120),
            }),
        );

        assert_eq!(applied, DispatchApplied::Delivered);
        assert_eq!(conv.phase(), ConversationPhase::AwaitingReply);
        assert_eq!(conv.metrics().webhook_latency, Some(Duration::from_millis(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_are_discarded_after_reset() {
        let mut conv = conversation();
        conv.submit("hello", true, Instant::now()).unwrap();
        let old_session = conv.session().id().to_string();

        conv.reset(Some(ana()));
        assert_ne!(conv.session().id(), old_session);
        assert_eq!(conv.log().len(), 1);
        assert_eq!(conv.phase(), ConversationPhase::Idle);

        let poll = conv.apply_poll(
            &old_session,
            vec![reply("m1", "late reply", &old_session)],
            Utc::now(),
            Instant::now(),
        );
        assert_eq!(poll, PollApplied::Stale);

        let dispatch = conv.dispatch_finished(&old_session, Err(DispatchError::Network("x".into())));
        assert_eq!(dispatch, DispatchApplied::Stale);
        assert_eq!(conv.log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_for_other_sessions_are_dropped() {
        let mut conv = conversation();
        let session_id = conv.session().id().to_string();

        let applied = conv.apply_poll(
            &session_id,
            vec![
                reply("m1", "wrong room", "quote_session_someone_else"),
                reply("m2", "right room", &session_id),
            ],
            Utc::now(),
            Instant::now(),
        );

        assert_eq!(applied, PollApplied::Accepted { count: 1 });
        assert!(!conv.log().contains("m1"));
        assert!(conv.log().contains("m2"));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_tracks_outstanding_turn() {
        let mut conv = conversation();
        let start = Instant::now();
        assert_eq!(conv.waiting_for(start), None);

        conv.submit("hello", true, start).unwrap();
        assert_eq!(
            conv.waiting_for(start + Duration::from_secs(42)),
            Some(Duration::from_secs(42))
        );

        let session_id = conv.session().id().to_string();
        conv.apply_poll(
            &session_id,
            vec![reply("m1", "hi there", &session_id)],
            Utc::now(),
            start + Duration::from_secs(43),
        );
        assert_eq!(conv.waiting_for(start + Duration::from_secs(50)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_clears_on_dispatch_failure() {
        let mut conv = conversation();
        let start = Instant::now();
        conv.submit("hello", true, start).unwrap();
        let session_id = conv.session().id().to_string();

        conv.dispatch_finished(&session_id, Err(DispatchError::Network("down".into())));
        assert_eq!(conv.waiting_for(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn set_user_resets_only_when_session_is_not_theirs() {
        let mut conv = Conversation::new(None, "Welcome!");
        let anonymous = conv.session().id().to_string();

        assert!(conv.set_user(Some(ana())));
        assert_ne!(conv.session().id(), anonymous);
        assert_eq!(conv.log().as_slice()[0].text, "Hey Ana, what's the customer scoop?");

        let session = conv.session().id().to_string();
        assert!(!conv.set_user(Some(ana().with_tech_id("tech-1"))));
        assert_eq!(conv.session().id(), session);
        assert_eq!(conv.user().and_then(|u| u.tech_id.as_deref()), Some("tech-1"));

        assert!(conv.set_user(None));
        assert_ne!(conv.session().id(), session);
        assert!(conv.user().is_none());
    }

    #[test]
    fn welcome_text_falls_back_for_blank_name() {
        let blank = UserContext::new("  ", "1", "x");
        assert_eq!(welcome_text(Some(&blank), "Default"), "Default");
        assert_eq!(welcome_text(None, "Default"), "Default");
    }
}
