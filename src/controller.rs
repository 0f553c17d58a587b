//! Conversation controller — the orchestrator for one user turn.
//!
//! Each submitted utterance is classified into one of three paths:
//!
//! - **example**: restate the last question with a sample answer; the
//!   pointer does not move
//! - **summary**: grant, refuse, or force the summary depending on
//!   coverage, frustration, and whether a summary was requested before
//! - **ordinary**: the full turn: primary oracle reply, directive scan,
//!   unconditional topic refresh, and a forced ANSWER/QUESTION
//!   classification that decides whether the pointer advances
//!
//! A failure of the primary oracle call is the only user-visible turn
//! error; every auxiliary call (extraction, refresh, classification)
//! degrades to a no-op so no auxiliary failure can abort a turn.

use crate::config::{
    QuestionnaireConfig, AFFIRMATIONS, EXAMPLE_PHRASES, FRUSTRATION_PHRASES, SUMMARY_PHRASES,
};
use crate::directive;
use crate::extract;
use crate::notify::{CompletionNotice, Notifier};
use crate::oracle::{ChatMessage, Oracle, OracleError};
use crate::session::Session;
use crate::summary;
use std::sync::Arc;
use tracing::{debug, warn};

const SUMMARY_CONFIRMATION: &str =
    "I'll prepare a summary of your responses. You can download it below.";

/// What a processed turn did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Example path: a sample answer was appended, pointer unchanged.
    Example,
    /// Summary path; `granted` reports whether `summary_requested` is now
    /// set.
    Summary { granted: bool },
    /// Ordinary path; `advanced` reports whether the pointer moved.
    Reply { advanced: bool },
}

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyInput,
    #[error("oracle call failed: {0}")]
    Oracle(#[from] OracleError),
}

/// Errors from finalization.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("summary has not been requested yet")]
    NotReady,
}

/// Drives the questionnaire conversation against an oracle.
pub struct ConversationController {
    oracle: Arc<dyn Oracle>,
    config: QuestionnaireConfig,
}

impl ConversationController {
    pub fn new(oracle: Arc<dyn Oracle>, config: QuestionnaireConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &QuestionnaireConfig {
        &self.config
    }

    /// Process one user utterance.
    pub async fn handle_turn(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        let lowered = trimmed.to_lowercase();

        if EXAMPLE_PHRASES.contains(&lowered.as_str()) {
            return self.example_path(session, trimmed).await;
        }

        let frustrated = FRUSTRATION_PHRASES.iter().any(|p| lowered.contains(p));
        if SUMMARY_PHRASES.contains(&lowered.as_str()) || frustrated {
            return Ok(self.summary_path(session, trimmed, frustrated));
        }

        self.ordinary_path(session, trimmed, &lowered).await
    }

    /// Example path: ask the oracle to restate its most recent message as
    /// a sample answer, then repeat the question. Nothing advances.
    async fn example_path(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let mut messages = session.context_messages(self.config.context_window);
        messages.push(ChatMessage::system(
            "Provide an example answer for the LAST question you asked. The example \
             MUST be directly relevant to what you just asked the user.\n\n\
             Format your response EXACTLY as follows, including the spacing:\n\n\
             *Example: \"[your example here]\"*\n\n\
             To continue with our question, [restate the original question in full]\n\n\
             Note: There must be a completely blank line between the example and the \
             question to create visual separation.",
        ));

        let reply = self.oracle.ask(&messages).await?;
        session.push_user(input);
        session.push_assistant(reply);
        Ok(TurnOutcome::Example)
    }

    /// Summary path. A frustration phrase or a repeat request forces
    /// completion; otherwise the request is granted only when every
    /// section is covered.
    fn summary_path(&self, session: &mut Session, input: &str, frustrated: bool) -> TurnOutcome {
        let force = frustrated || session.previous_summary_request;
        session.previous_summary_request = true;

        session.push_user(input);

        if force {
            // The override flips coverage first so the ledger is never
            // inconsistent with the summary flag.
            session.coverage_mut().force_complete();
            session.request_summary();
            session.push_assistant(SUMMARY_CONFIRMATION);
            debug!("summary force-granted (frustrated: {})", frustrated);
            return TurnOutcome::Summary { granted: true };
        }

        if session.coverage().is_complete() {
            session.request_summary();
            session.push_assistant(SUMMARY_CONFIRMATION);
            TurnOutcome::Summary { granted: true }
        } else {
            let missing = session
                .coverage()
                .missing()
                .iter()
                .map(|k| self.config.topic_title(k))
                .collect::<Vec<_>>()
                .join(", ");
            session.push_assistant(format!(
                "I see you'd like a summary, but we still have a few important areas \
                 to cover: {}. Let's quickly address these topics so we can complete \
                 your questionnaire.",
                missing
            ));
            TurnOutcome::Summary { granted: false }
        }
    }

    /// Ordinary path: the full turn with up to four oracle round trips.
    async fn ordinary_path(
        &self,
        session: &mut Session,
        input: &str,
        lowered: &str,
    ) -> Result<TurnOutcome, TurnError> {
        session.push_user(input);

        if session.is_first_reply() {
            extract::extract_respondent(self.oracle.as_ref(), session, input).await;
        }

        // Primary reply. The utterance stays appended even if this fails;
        // the transcript is append-only.
        let reply = self
            .oracle
            .ask(&session.context_messages(self.config.context_window))
            .await?;

        let handled = directive::apply(session, &self.config, &reply);
        if !handled {
            session.push_assistant(reply);
            self.refresh_topic_coverage(session).await;
            // Applied again at this level in case the refresh reply carried
            // no directive but coverage already sits at the threshold.
            directive::maybe_focus_nudge(session, &self.config);
        }

        let advanced = self.maybe_advance(session, input, lowered).await?;
        Ok(TurnOutcome::Reply { advanced })
    }

    /// Unconditional per-turn coverage refresh: ask the oracle for a fresh
    /// topic-status directive and feed it back into the interpreter.
    async fn refresh_topic_coverage(&self, session: &mut Session) {
        let mut messages = session.context_messages(self.config.context_window);
        messages.push(ChatMessage::system(
            "Based on all conversation so far, which sections have been covered? \
             Respond ONLY with a TOPIC_UPDATE message that includes the status of \
             ALL topic areas.",
        ));

        match self.oracle.ask(&messages).await {
            Ok(reply) => {
                directive::apply(session, &self.config, &reply);
            }
            Err(e) => warn!("topic refresh call failed: {}", e),
        }
    }

    /// Forced binary classification of the utterance against the current
    /// question; on ANSWER, record it and advance (or reroute a bare
    /// affirmation to a summary question into the summary path).
    ///
    /// Returns whether the pointer advanced. A classification failure
    /// counts as QUESTION so the pointer never moves on a failed check.
    async fn maybe_advance(
        &self,
        session: &mut Session,
        input: &str,
        lowered: &str,
    ) -> Result<bool, TurnError> {
        let current_question = match session.current_question() {
            Some(q) => q.to_string(),
            None => return Ok(false),
        };

        let check = vec![
            ChatMessage::system(
                "You are helping to determine if a user message is an answer to a \
                 question or a request for help/clarification.",
            ),
            ChatMessage::user(format!(
                "Question: {}\nUser message: {}\nIs this a direct answer to the \
                 question or a request for help/clarification? Reply with exactly \
                 'ANSWER' or 'QUESTION'.",
                current_question, input
            )),
        ];

        let verdict = match self.oracle.ask(&check).await {
            Ok(v) => v,
            Err(e) => {
                warn!("answer classification call failed: {}", e);
                return Ok(false);
            }
        };
        if !verdict.to_uppercase().contains("ANSWER") {
            return Ok(false);
        }

        // A bare "yes" to a question about the summary is a summary
        // request, not an answer to record.
        if current_question.to_lowercase().contains("summary")
            && AFFIRMATIONS.contains(&lowered)
        {
            self.summary_path(session, input, false);
            return Ok(false);
        }

        if !session.is_first_reply() {
            extract::detect_additional_topics(
                self.oracle.as_ref(),
                session,
                &self.config,
                input,
                &current_question,
            )
            .await;
        }

        session.record_answer(input);
        Ok(true)
    }

    /// Finalize a completed questionnaire: the explicit human-in-the-loop
    /// checkpoint after the summary is granted. Fires the completion
    /// notification exactly once per session and returns the compiled
    /// summary.
    pub fn finalize(
        &self,
        session: &mut Session,
        notifier: &dyn Notifier,
    ) -> Result<String, FinalizeError> {
        if !session.summary_requested() {
            return Err(FinalizeError::NotReady);
        }
        session.mark_finalized();

        if session.take_notification_slot() {
            let notice = CompletionNotice::from_session(session);
            if let Err(e) = notifier.notify(&notice) {
                warn!("completion notification failed: {}", e);
            }
        }

        Ok(summary::compile(session, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::oracle::{MockOracle, Role};
    use std::sync::Mutex;

    const NO_TOPICS: &str =
        "TOPIC_UPDATE: {\"crew_manager_usage\": false, \"emergency_contract_ops\": false, \
         \"resources_reporting\": false, \"current_practices\": false}";

    fn controller(oracle: MockOracle) -> ConversationController {
        ConversationController::new(Arc::new(oracle), QuestionnaireConfig::default())
    }

    fn session() -> Session {
        Session::new(&QuestionnaireConfig::default())
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_mutation() {
        let ctl = controller(MockOracle::new());
        let mut s = session();
        let before = s.transcript().len();
        let err = ctl.handle_turn(&mut s, "   ").await.unwrap_err();
        assert!(matches!(err, TurnError::EmptyInput));
        assert_eq!(s.transcript().len(), before);
    }

    #[tokio::test]
    async fn first_reply_runs_extraction_and_advances() {
        // Call order: extraction, primary reply, topic refresh, classification.
        let oracle = MockOracle::new()
            .with_reply("NAME: Jane Doe, ORGANIZATION: Acme Corp")
            .with_reply("Great, thanks Jane! In what situations will crew management be used?")
            .with_reply(NO_TOPICS)
            .with_reply("ANSWER");
        let ctl = controller(oracle);
        let mut s = session();

        let outcome = ctl.handle_turn(&mut s, "Jane Doe, Acme Corp").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Reply { advanced: true });
        assert_eq!(s.respondent.name, "Jane Doe");
        assert_eq!(s.question_pointer(), 1);
        assert_eq!(s.answers().len(), 1);
        assert_eq!(
            s.answers()[0].0,
            "Could you please provide your name and your organization name?"
        );
        // Primary reply reached the visible transcript; the directive did not.
        assert!(s
            .visible()
            .iter()
            .any(|m| m.content.contains("thanks Jane")));
        assert!(s.visible().iter().all(|m| !m.content.contains("TOPIC_UPDATE")));
    }

    #[tokio::test]
    async fn question_verdict_does_not_advance() {
        let oracle = MockOracle::new()
            .with_reply("NAME: unknown, ORGANIZATION: unknown")
            .with_reply("Happy to clarify: it means who you call first.")
            .with_reply(NO_TOPICS)
            .with_reply("QUESTION");
        let ctl = controller(oracle);
        let mut s = session();

        let outcome = ctl.handle_turn(&mut s, "what does that mean?").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Reply { advanced: false });
        assert_eq!(s.question_pointer(), 0);
        assert!(s.answers().is_empty());
    }

    #[tokio::test]
    async fn classification_failure_counts_as_question() {
        let oracle = MockOracle::new()
            .with_reply("NAME: unknown, ORGANIZATION: unknown")
            .with_reply("A reply")
            .with_reply(NO_TOPICS)
            .with_failure();
        let ctl = controller(oracle);
        let mut s = session();

        let outcome = ctl.handle_turn(&mut s, "some text").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Reply { advanced: false });
        assert_eq!(s.question_pointer(), 0);
    }

    #[tokio::test]
    async fn primary_failure_is_the_turn_error() {
        let oracle = MockOracle::new()
            .with_reply("NAME: unknown, ORGANIZATION: unknown")
            .with_failure();
        let ctl = controller(oracle);
        let mut s = session();

        let err = ctl.handle_turn(&mut s, "hello there").await.unwrap_err();
        assert!(matches!(err, TurnError::Oracle(_)));
        // The utterance stays: the transcript is append-only.
        assert_eq!(s.visible().last().unwrap().content, "hello there");
    }

    #[tokio::test]
    async fn directive_reply_skips_refresh_and_stays_invisible() {
        let oracle = MockOracle::new()
            .with_reply("NAME: unknown, ORGANIZATION: unknown")
            .with_reply("TOPIC_UPDATE: {\"crew_manager_usage\": true}")
            .with_reply("QUESTION");
        let ctl = controller(oracle);
        let mut s = session();

        ctl.handle_turn(&mut s, "we use it daily").await.unwrap();

        assert_eq!(s.coverage().get("crew_manager_usage"), Some(true));
        // Only the user utterance joined the visible transcript this turn.
        assert_eq!(s.visible().last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn example_request_does_not_advance() {
        let oracle = MockOracle::new()
            .with_reply("*Example: \"We run three storm crews.\"*\n\nTo continue with our question, could you please provide your name and your organization name?");
        let ctl = controller(oracle);
        let mut s = session();

        let outcome = ctl.handle_turn(&mut s, "Example").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Example);
        assert_eq!(s.question_pointer(), 0);
        assert!(s
            .visible()
            .last()
            .unwrap()
            .content
            .starts_with("*Example:"));
    }

    #[tokio::test]
    async fn summary_refused_when_sections_missing() {
        let ctl = controller(MockOracle::new());
        let mut s = session();

        let outcome = ctl.handle_turn(&mut s, "summary").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Summary { granted: false });
        assert!(!s.summary_requested());
        assert!(s.previous_summary_request);
        let refusal = s.visible().last().unwrap();
        assert_eq!(refusal.role, Role::Assistant);
        for section in [
            "Section 1: Crew Manager Usage",
            "Section 2: Emergency and Contract Operations",
            "Section 3: Resources and Reporting",
            "Section 4: Current Practices and Needs",
        ] {
            assert!(refusal.content.contains(section), "missing {}", section);
        }
    }

    #[tokio::test]
    async fn second_summary_request_force_completes() {
        let ctl = controller(MockOracle::new());
        let mut s = session();

        ctl.handle_turn(&mut s, "summary").await.unwrap();
        assert!(!s.summary_requested());

        let outcome = ctl.handle_turn(&mut s, "summary").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Summary { granted: true });
        assert!(s.summary_requested());
        assert!(s.coverage().is_complete());
    }

    #[tokio::test]
    async fn frustration_force_completes_immediately() {
        let ctl = controller(MockOracle::new());
        let mut s = session();

        let outcome = ctl
            .handle_turn(&mut s, "I already answered that, this is not helpful")
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Summary { granted: true });
        assert!(s.summary_requested());
        assert!(s.coverage().is_complete());
    }

    #[tokio::test]
    async fn summary_granted_when_complete() {
        let ctl = controller(MockOracle::new());
        let mut s = session();
        s.coverage_mut().force_complete();

        let outcome = ctl.handle_turn(&mut s, "get summary").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Summary { granted: true });
        assert!(s.summary_requested());
        assert_eq!(s.visible().last().unwrap().content, SUMMARY_CONFIRMATION);
    }

    #[tokio::test]
    async fn affirmation_to_summary_question_reroutes() {
        // "yes" is in the summary phrase set, so drive the pointer onto the
        // summary question and answer with an affirmation not in that set.
        let cfg = QuestionnaireConfig::default();
        let summary_q = cfg
            .questions
            .iter()
            .position(|q| q.to_lowercase().contains("summary"))
            .expect("default questions end with a summary question");

        let oracle = MockOracle::new()
            .with_reply("Sounds good!")
            .with_reply(NO_TOPICS)
            .with_reply("ANSWER");
        let ctl = ConversationController::new(Arc::new(oracle), cfg);
        let mut s = session();
        for i in 0..summary_q {
            s.record_answer(format!("answer {}", i));
        }

        let outcome = ctl.handle_turn(&mut s, "sure").await.unwrap();

        // Rerouted into the summary path: pointer unchanged, no answer recorded.
        assert_eq!(outcome, TurnOutcome::Reply { advanced: false });
        assert_eq!(s.question_pointer(), summary_q);
        assert!(s.previous_summary_request);
        assert!(!s.summary_requested());
    }

    #[tokio::test]
    async fn multi_topic_detection_runs_on_later_answers() {
        let oracle = MockOracle::new()
            .with_reply("Thanks! Next question.")
            .with_reply(NO_TOPICS)
            .with_reply("ANSWER")
            .with_reply("{\"additional_topics\": [\"resources_reporting\"]}");
        let ctl = controller(oracle);
        let mut s = session();
        s.record_answer("Jane, Acme");

        let outcome = ctl
            .handle_turn(&mut s, "storm response, plus we track availability in a spreadsheet")
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Reply { advanced: true });
        assert_eq!(s.coverage().get("resources_reporting"), Some(true));
        assert_eq!(s.question_pointer(), 2);
    }

    #[tokio::test]
    async fn near_complete_refresh_installs_focus_nudge() {
        let oracle = MockOracle::new()
            .with_reply("Thanks! Tell me more.")
            .with_reply(
                "TOPIC_UPDATE: {\"crew_manager_usage\": true, \
                 \"emergency_contract_ops\": true, \"resources_reporting\": true}",
            )
            .with_reply("ANSWER")
            .with_reply("{\"additional_topics\": []}");
        let ctl = controller(oracle);
        let mut s = session();
        s.record_answer("Jane, Acme");

        ctl.handle_turn(&mut s, "a very thorough answer").await.unwrap();

        let nudges: Vec<_> = s
            .transcript()
            .iter()
            .filter(|m| {
                m.role == Role::System && m.content.contains("have not been covered yet")
            })
            .collect();
        assert_eq!(nudges.len(), 1);
        assert!(nudges[0]
            .content
            .contains("Section 4: Current Practices and Needs"));
    }

    struct RecordingNotifier {
        notices: Mutex<Vec<CompletionNotice>>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                notices: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.notices.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: &CompletionNotice) -> Result<(), NotifyError> {
            self.notices.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn finalize_requires_summary_and_notifies_once() {
        let ctl = controller(MockOracle::new());
        let notifier = RecordingNotifier::new();
        let mut s = session();
        s.record_answer("Jane, Acme");

        assert!(matches!(
            ctl.finalize(&mut s, &notifier),
            Err(FinalizeError::NotReady)
        ));

        ctl.handle_turn(&mut s, "not helpful").await.unwrap();
        let summary = ctl.finalize(&mut s, &notifier).unwrap();
        assert!(s.finalized());
        assert!(summary.contains("# Questionnaire Summary"));
        assert_eq!(notifier.count(), 1);

        // Re-finalizing (a UI re-render) must not notify again.
        ctl.finalize(&mut s, &notifier).unwrap();
        assert_eq!(notifier.count(), 1);
    }
}
