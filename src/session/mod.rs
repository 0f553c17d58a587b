//! Session: the single long-lived aggregate for one questionnaire run.
//!
//! Owned exclusively by one interactive run; created at first interaction,
//! mutated by every turn, replaced wholesale on snapshot import. All state
//! flows through explicit methods; there is no ambient context.
//!
//! Invariants maintained here:
//! - the coverage key set is fixed at creation
//! - the question pointer only increases, clamped at the question count
//! - `summary_requested` and `finalized` are monotonic
//! - every visible entry has a causally-prior transcript entry, and no
//!   system message is ever visible

pub mod snapshot;

pub use snapshot::SessionSnapshot;

use crate::config::{QuestionnaireConfig, WELCOME_MESSAGE};
use crate::coverage::CoverageLedger;
use crate::oracle::ChatMessage;

/// Who is filling in the questionnaire. Mutated only by the extraction
/// helpers, never by direct assignment from user text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Respondent {
    pub name: String,
    pub organization: String,
}

impl Respondent {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.organization.is_empty()
    }
}

/// The conversation state for one questionnaire run.
#[derive(Debug, Clone)]
pub struct Session {
    pub respondent: Respondent,
    questions: Vec<String>,
    transcript: Vec<ChatMessage>,
    visible: Vec<ChatMessage>,
    question_pointer: usize,
    answers: Vec<(String, String)>,
    coverage: CoverageLedger,
    summary_requested: bool,
    pub previous_summary_request: bool,
    finalized: bool,
    notification_sent: bool,
    /// Fingerprint and transcript index of the active missing-topics nudge,
    /// so repeated nudges replace rather than accumulate.
    focus_nudge: Option<(String, usize)>,
}

impl Session {
    /// Create a fresh session seeded with the system instruction and the
    /// welcome greeting (which carries the first question).
    pub fn new(config: &QuestionnaireConfig) -> Self {
        let mut session = Self {
            respondent: Respondent::default(),
            questions: config.questions.clone(),
            transcript: vec![ChatMessage::system(config.instructions.clone())],
            visible: Vec::new(),
            question_pointer: 0,
            answers: Vec::new(),
            coverage: CoverageLedger::from_topics(&config.topics),
            summary_requested: false,
            previous_summary_request: false,
            finalized: false,
            notification_sent: false,
            focus_nudge: None,
        };
        session.push_assistant(WELCOME_MESSAGE);
        session
    }

    /// The question the pointer currently rests on, if any remain.
    pub fn current_question(&self) -> Option<&str> {
        self.questions.get(self.question_pointer).map(|q| q.as_str())
    }

    pub fn question_pointer(&self) -> usize {
        self.question_pointer
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// True until the first answer is confirmed, i.e. the
    /// respondent-extraction window.
    pub fn is_first_reply(&self) -> bool {
        self.question_pointer == 0
    }

    /// Record a confirmed answer to the current question and advance the
    /// pointer, clamped at the question count.
    pub fn record_answer(&mut self, answer: impl Into<String>) {
        if let Some(question) = self.current_question() {
            self.answers.push((question.to_string(), answer.into()));
        }
        self.question_pointer = (self.question_pointer + 1).min(self.questions.len());
    }

    pub fn answers(&self) -> &[(String, String)] {
        &self.answers
    }

    pub fn coverage(&self) -> &CoverageLedger {
        &self.coverage
    }

    pub fn coverage_mut(&mut self) -> &mut CoverageLedger {
        &mut self.coverage
    }

    /// Full transcript, including injected system directives.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Display projection of the transcript (no system messages).
    pub fn visible(&self) -> &[ChatMessage] {
        &self.visible
    }

    /// Append a user message to both the transcript and the visible
    /// projection.
    pub fn push_user(&mut self, content: impl Into<String>) {
        let msg = ChatMessage::user(content);
        self.transcript.push(msg.clone());
        self.visible.push(msg);
    }

    /// Append an assistant message to both the transcript and the visible
    /// projection.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        let msg = ChatMessage::assistant(content);
        self.transcript.push(msg.clone());
        self.visible.push(msg);
    }

    /// Append a system message to the transcript only.
    pub fn push_system(&mut self, content: impl Into<String>) {
        self.transcript.push(ChatMessage::system(content));
    }

    /// Install a missing-topics focus nudge. A nudge with the same
    /// fingerprint is a no-op; a nudge with a new fingerprint replaces the
    /// previous one in place instead of stacking another system message.
    pub fn set_focus_nudge(&mut self, content: impl Into<String>, fingerprint: impl Into<String>) {
        let fingerprint = fingerprint.into();
        match &self.focus_nudge {
            Some((fp, _)) if *fp == fingerprint => {}
            Some((_, idx)) => {
                let idx = *idx;
                self.transcript[idx] = ChatMessage::system(content);
                self.focus_nudge = Some((fingerprint, idx));
            }
            None => {
                self.transcript.push(ChatMessage::system(content));
                self.focus_nudge = Some((fingerprint, self.transcript.len() - 1));
            }
        }
    }

    pub fn summary_requested(&self) -> bool {
        self.summary_requested
    }

    /// Flip `summary_requested` true (monotonic).
    pub fn request_summary(&mut self) {
        self.summary_requested = true;
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Flip `finalized` true (monotonic).
    pub fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    /// One-shot guard for the completion notification. Returns true the
    /// first time only.
    pub fn take_notification_slot(&mut self) -> bool {
        if self.notification_sent {
            false
        } else {
            self.notification_sent = true;
            true
        }
    }

    /// Messages to send to the oracle, applying the context-window policy:
    /// the leading system instruction plus the last `n` entries when a
    /// window is configured, the whole transcript otherwise.
    pub fn context_messages(&self, window: Option<usize>) -> Vec<ChatMessage> {
        match window {
            Some(n) if self.transcript.len() > n + 1 => {
                let mut msgs = Vec::with_capacity(n + 1);
                msgs.push(self.transcript[0].clone());
                msgs.extend(self.transcript[self.transcript.len() - n..].iter().cloned());
                msgs
            }
            _ => self.transcript.clone(),
        }
    }

    /// The most recent assistant message shown to the user, used by the
    /// example path to restate the pending question.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.visible
            .iter()
            .rev()
            .find(|m| m.role == crate::oracle::Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub(crate) fn restore_parts(
        config: &QuestionnaireConfig,
        respondent: Respondent,
        transcript: Vec<ChatMessage>,
        visible: Vec<ChatMessage>,
        question_pointer: usize,
        answers: Vec<(String, String)>,
        coverage: CoverageLedger,
    ) -> Self {
        Self {
            respondent,
            questions: config.questions.clone(),
            transcript,
            visible,
            question_pointer: question_pointer.min(config.questions.len()),
            answers,
            coverage,
            summary_requested: false,
            previous_summary_request: false,
            finalized: false,
            notification_sent: false,
            focus_nudge: None,
        }
    }
}
