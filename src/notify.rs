//! Completion notification: a one-shot notice assembled when a finished
//! questionnaire is finalized.
//!
//! The notice itself is transport-agnostic. [`LogNotifier`] is the default
//! sink and writes the notice to the log; an operator deployment would plug
//! in its own [`Notifier`].

use crate::export;
use crate::session::Session;
use chrono::Local;
use tracing::{info, warn};

const PREVIEW_LIMIT: usize = 5;

/// A file attached to a completion notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Everything a notification sink needs to announce a finished session.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub respondent_name: String,
    pub respondent_organization: String,
    pub completed_at: String,
    pub answered: usize,
    pub total_questions: usize,
    /// Up to the first five question-answer pairs.
    pub preview: Vec<(String, String)>,
    pub attachments: Vec<Attachment>,
}

impl CompletionNotice {
    pub fn from_session(session: &Session) -> Self {
        let answers = session.answers();

        let mut attachments = vec![Attachment {
            filename: "responses.csv".into(),
            content: export::generate_csv(answers).into_bytes(),
        }];
        match export::generate_json(answers, &session.respondent) {
            Ok(json) => attachments.push(Attachment {
                filename: "responses.json".into(),
                content: json.into_bytes(),
            }),
            Err(e) => warn!("JSON attachment skipped: {}", e),
        }

        Self {
            respondent_name: session.respondent.name.clone(),
            respondent_organization: session.respondent.organization.clone(),
            completed_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            answered: answers.len(),
            total_questions: session.question_count(),
            preview: answers.iter().take(PREVIEW_LIMIT).cloned().collect(),
            attachments,
        }
    }

    /// One-line subject for the notice.
    pub fn subject(&self) -> String {
        format!(
            "Questionnaire completed - {} from {}",
            display_or_unknown(&self.respondent_name),
            display_or_unknown(&self.respondent_organization)
        )
    }
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "(unknown)"
    } else {
        value
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// A sink for completion notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), NotifyError>;
}

/// Default sink: writes the notice to the structured log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), NotifyError> {
        info!(
            subject = %notice.subject(),
            answered = notice.answered,
            total = notice.total_questions,
            attachments = notice.attachments.len(),
            "questionnaire completed"
        );
        for (question, answer) in &notice.preview {
            info!("Q: {} | A: {}", question, answer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuestionnaireConfig;

    fn answered_session(n: usize) -> Session {
        let config = QuestionnaireConfig::default();
        let mut session = Session::new(&config);
        for i in 0..n {
            session.record_answer(format!("answer {}", i));
        }
        session
    }

    #[test]
    fn preview_caps_at_five_pairs() {
        let session = answered_session(8);
        let notice = CompletionNotice::from_session(&session);
        assert_eq!(notice.answered, 8);
        assert_eq!(notice.preview.len(), 5);
        assert_eq!(notice.preview[0].1, "answer 0");
    }

    #[test]
    fn notice_carries_csv_and_json_attachments() {
        let session = answered_session(2);
        let notice = CompletionNotice::from_session(&session);

        let names: Vec<_> = notice.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["responses.csv", "responses.json"]);

        let csv = String::from_utf8(notice.attachments[0].content.clone()).unwrap();
        assert!(csv.starts_with("Question,Answer"));
        let json: serde_json::Value =
            serde_json::from_slice(&notice.attachments[1].content).unwrap();
        assert_eq!(json["responses"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn subject_falls_back_when_respondent_unknown() {
        let session = answered_session(0);
        let notice = CompletionNotice::from_session(&session);
        assert_eq!(
            notice.subject(),
            "Questionnaire completed - (unknown) from (unknown)"
        );
    }

    #[test]
    fn log_notifier_accepts_any_notice() {
        let session = answered_session(1);
        let notice = CompletionNotice::from_session(&session);
        LogNotifier.notify(&notice).unwrap();
    }
}
