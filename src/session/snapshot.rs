//! Persistence snapshot: the wire format for saving and resuming a
//! session.
//!
//! The snapshot is a plain JSON object with the fields `user_info`
//! (`name`/`company`), `responses`, `current_question_index`,
//! `chat_history`, `visible_messages`, and `topic_areas_covered`.
//! Export then import reproduces an equivalent session; malformed
//! transcript entries are dropped on import, and a failed full export
//! degrades to a minimal reconstruction (respondent and pointer
//! preserved, history collapsed to a single placeholder system entry).
//!
//! Import is an atomic whole-session replacement, never a merge.

use super::{Respondent, Session};
use crate::config::QuestionnaireConfig;
use crate::coverage::CoverageLedger;
use crate::oracle::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: String,
}

/// JSON-serializable copy of the session state.
///
/// Transcript entries are kept as raw JSON values so that individually
/// malformed entries can be dropped on import instead of failing the
/// whole restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default)]
    pub responses: Vec<(String, String)>,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub chat_history: Vec<Value>,
    #[serde(default)]
    pub visible_messages: Vec<Value>,
    #[serde(default)]
    pub topic_areas_covered: BTreeMap<String, bool>,
}

impl SessionSnapshot {
    /// Capture the full session state.
    pub fn export(session: &Session) -> Self {
        Self {
            user_info: UserInfo {
                name: session.respondent.name.clone(),
                company: session.respondent.organization.clone(),
            },
            responses: session.answers().to_vec(),
            current_question_index: session.question_pointer(),
            chat_history: session.transcript().iter().map(message_to_value).collect(),
            visible_messages: session.visible().iter().map(message_to_value).collect(),
            topic_areas_covered: session.coverage().to_map(),
        }
    }

    /// Stripped-down snapshot: respondent, responses, and pointer only,
    /// with the history collapsed to a single placeholder entry.
    pub fn minimal(session: &Session) -> Self {
        Self {
            user_info: UserInfo {
                name: session.respondent.name.clone(),
                company: session.respondent.organization.clone(),
            },
            responses: session.answers().to_vec(),
            current_question_index: session.question_pointer(),
            chat_history: vec![serde_json::json!({
                "role": "system",
                "content": "Session restored"
            })],
            visible_messages: Vec::new(),
            topic_areas_covered: session.coverage().to_map(),
        }
    }

    /// Serialize to JSON, degrading to the minimal snapshot if the full
    /// one cannot be serialized.
    pub fn to_json(&self, session: &Session) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                warn!("full snapshot serialization failed, writing minimal: {}", e);
                serde_json::to_string(&Self::minimal(session))
                    .unwrap_or_else(|_| "{}".to_string())
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Rebuild a session from this snapshot. The result replaces any prior
    /// session wholesale.
    ///
    /// - malformed transcript entries are dropped
    /// - an empty chat history is re-seeded with the system instruction
    /// - system-role entries are excluded from the visible projection
    /// - an out-of-range question index is clamped to the question count
    /// - only known topic keys are restored
    pub fn restore(&self, config: &QuestionnaireConfig) -> Session {
        let mut transcript: Vec<ChatMessage> = self
            .chat_history
            .iter()
            .filter_map(message_from_value)
            .collect();
        if transcript.is_empty() {
            transcript.push(ChatMessage::system(config.instructions.clone()));
        }

        let visible: Vec<ChatMessage> = self
            .visible_messages
            .iter()
            .filter_map(message_from_value)
            .filter(|m| m.role != Role::System)
            .collect();

        let mut coverage = CoverageLedger::from_topics(&config.topics);
        coverage.apply_map(&self.topic_areas_covered);

        Session::restore_parts(
            config,
            Respondent {
                name: self.user_info.name.clone(),
                organization: self.user_info.company.clone(),
            },
            transcript,
            visible,
            self.current_question_index,
            self.responses.clone(),
            coverage,
        )
    }
}

/// Convenience wrapper: session → snapshot JSON.
pub fn export_session_data(session: &Session) -> String {
    SessionSnapshot::export(session).to_json(session)
}

/// Convenience wrapper: snapshot JSON → session, replacing any prior one.
pub fn import_session_data(
    json: &str,
    config: &QuestionnaireConfig,
) -> Result<Session, serde_json::Error> {
    Ok(SessionSnapshot::from_json(json)?.restore(config))
}

fn message_to_value(msg: &ChatMessage) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

/// Accept only well-formed `{role, content}` objects with a known role.
fn message_from_value(value: &Value) -> Option<ChatMessage> {
    let role = Role::parse(value.get("role")?.as_str()?)?;
    let content = value.get("content")?.as_str()?.to_string();
    Some(ChatMessage { role, content })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QuestionnaireConfig {
        QuestionnaireConfig::default()
    }

    fn populated_session() -> Session {
        let cfg = config();
        let mut session = Session::new(&cfg);
        session.respondent = Respondent {
            name: "Jane Doe".to_string(),
            organization: "Acme Corp".to_string(),
        };
        session.push_user("Jane Doe, Acme Corp");
        session.push_assistant("Thanks! Next question?");
        session.push_system("internal directive");
        session.record_answer("Jane Doe, Acme Corp");
        session.record_answer("We dispatch storm crews.");
        session.coverage_mut().mark("crew_manager_usage", true);
        session.coverage_mut().mark("emergency_contract_ops", true);
        session
    }

    #[test]
    fn round_trip_preserves_core_state() {
        let cfg = config();
        let session = populated_session();

        let json = export_session_data(&session);
        let restored = import_session_data(&json, &cfg).unwrap();

        assert_eq!(restored.respondent, session.respondent);
        assert_eq!(restored.answers(), session.answers());
        assert_eq!(restored.question_pointer(), session.question_pointer());
        assert_eq!(restored.coverage(), session.coverage());
        assert_eq!(restored.transcript(), session.transcript());
        assert_eq!(restored.visible(), session.visible());
    }

    #[test]
    fn malformed_history_entries_are_dropped() {
        let cfg = config();
        let json = serde_json::json!({
            "user_info": {"name": "Jane", "company": "Acme"},
            "responses": [],
            "current_question_index": 1,
            "chat_history": [
                {"role": "system", "content": "inst"},
                {"role": "tool", "content": "unknown role"},
                42,
                {"role": "user", "content": "hello"},
                {"content": "no role"}
            ],
            "visible_messages": [
                {"role": "system", "content": "should not be visible"},
                {"role": "user", "content": "hello"}
            ],
            "topic_areas_covered": {"crew_manager_usage": true, "bogus": true}
        })
        .to_string();

        let session = import_session_data(&json, &cfg).unwrap();
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.visible().len(), 1);
        assert_eq!(session.coverage().covered_count(), 1);
        assert_eq!(session.coverage().get("bogus"), None);
    }

    #[test]
    fn empty_history_reseeds_system_instruction() {
        let cfg = config();
        let json = serde_json::json!({
            "user_info": {"name": "", "company": ""},
            "responses": [],
            "current_question_index": 0,
            "chat_history": [],
            "visible_messages": [],
        })
        .to_string();

        let session = import_session_data(&json, &cfg).unwrap();
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, Role::System);
        assert_eq!(session.transcript()[0].content, cfg.instructions);
    }

    #[test]
    fn out_of_range_index_is_clamped() {
        let cfg = config();
        let json = serde_json::json!({
            "current_question_index": 9999,
        })
        .to_string();

        let session = import_session_data(&json, &cfg).unwrap();
        assert_eq!(session.question_pointer(), cfg.questions.len());
        assert!(session.current_question().is_none());
    }

    #[test]
    fn minimal_snapshot_collapses_history() {
        let session = populated_session();
        let minimal = SessionSnapshot::minimal(&session);
        assert_eq!(minimal.chat_history.len(), 1);
        assert_eq!(minimal.chat_history[0]["content"], "Session restored");
        assert_eq!(minimal.user_info.name, "Jane Doe");
        assert_eq!(minimal.responses.len(), 2);
    }

    #[test]
    fn top_level_garbage_is_an_error() {
        let cfg = config();
        assert!(import_session_data("not json", &cfg).is_err());
    }
}
