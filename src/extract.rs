//! Best-effort extraction helpers: respondent identity and multi-topic
//! detection.
//!
//! Each helper is one additional oracle round trip with a narrowly scoped
//! prompt, followed by deterministic string parsing of the reply. Both are
//! fire-and-forget: a transport or parse failure degrades to "no
//! extraction happened this turn" and is never surfaced as a user-visible
//! error.

use crate::config::QuestionnaireConfig;
use crate::oracle::{ChatMessage, Oracle};
use crate::session::{Respondent, Session};
use tracing::{debug, warn};

const UNKNOWN: &str = "unknown";

/// Parse a respondent-extraction reply of the shape
/// `NAME: [name], ORGANIZATION: [organization]`.
///
/// The legacy `COMPANY:` label is accepted in place of `ORGANIZATION:`.
/// Bracket characters are stripped; the literal `unknown` maps to `None`.
pub fn parse_respondent_reply(text: &str) -> (Option<String>, Option<String>) {
    let name = text.split("NAME:").nth(1).and_then(|rest| {
        let field = rest.split(',').next().unwrap_or("");
        clean_field(field)
    });

    let organization = text
        .split("ORGANIZATION:")
        .nth(1)
        .or_else(|| text.split("COMPANY:").nth(1))
        .and_then(clean_field);

    (name, organization)
}

fn clean_field(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '[' && *c != ']')
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case(UNKNOWN) {
        None
    } else {
        Some(cleaned)
    }
}

/// Parse a multi-topic detection reply: the span from the first `{` to the
/// last `}` is treated as JSON and its `additional_topics` array read out.
/// Anything malformed yields an empty list.
pub fn parse_additional_topics(text: &str) -> Vec<String> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => return Vec::new(),
    };

    match serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
        Ok(value) => value
            .get("additional_topics")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            debug!("additional-topics payload did not parse: {}", e);
            Vec::new()
        }
    }
}

/// Extract the respondent's name and organization from their first reply.
///
/// Runs only while the question pointer is on the first question. On
/// success the respondent is overwritten destructively (a missing field
/// becomes empty, not its prior value) and context system messages are
/// appended so the oracle stops asking for what it already has.
pub async fn extract_respondent(oracle: &dyn Oracle, session: &mut Session, user_input: &str) {
    let prompt = vec![
        ChatMessage::system(
            "Extract the user name and organization name from this response to the \
             question 'Could you please provide your name and your organization name?'. \
             Even if the response is brief or partial, try to identify name and \
             organization information.",
        ),
        ChatMessage::user(format!(
            "User response: {}\nExtract only the name and organization. Format your \
             response exactly as: NAME: [name], ORGANIZATION: [organization]. If you \
             can only extract one of these, still provide it and use 'unknown' for \
             the other.",
            user_input
        )),
    ];

    let reply = match oracle.ask(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("respondent extraction call failed: {}", e);
            return;
        }
    };

    let (name, organization) = parse_respondent_reply(&reply);
    if name.is_none() && organization.is_none() {
        debug!("respondent extraction found nothing in {:?}", reply);
        return;
    }

    session.respondent = Respondent {
        name: name.clone().unwrap_or_default(),
        organization: organization.clone().unwrap_or_default(),
    };

    session.push_system(format!(
        "The user's name is {} and they work for {}. If you know the user's name, \
         address them by it. Do not ask for name or organization information again \
         if it has been provided.",
        name.as_deref().unwrap_or("not provided yet"),
        organization
            .as_deref()
            .unwrap_or("an organization that has not been mentioned yet"),
    ));

    // Exactly one field recovered: ask for the other next turn.
    match (name, organization) {
        (None, Some(org)) => {
            session.push_system(format!(
                "The user has mentioned their organization ({}) but not their name. \
                 In your next response, thank them for the organization information \
                 and ask for their name.",
                org
            ));
        }
        (Some(name), None) => {
            session.push_system(format!(
                "The user has mentioned their name ({}) but not their organization. \
                 In your next response, address them by name and ask for their \
                 organization name.",
                name
            ));
        }
        _ => {}
    }
}

/// Check whether an answer also incidentally covered other known sections.
///
/// Marks any detected known section covered and appends a system note so
/// the oracle avoids re-asking about it.
pub async fn detect_additional_topics(
    oracle: &dyn Oracle,
    session: &mut Session,
    config: &QuestionnaireConfig,
    user_input: &str,
    current_question: &str,
) {
    let prompt = vec![
        ChatMessage::system(
            "Analyze if this user response answers multiple questions at once. \
             Identify any additional topics covered beyond the current question.",
        ),
        ChatMessage::user(format!(
            "Current question: {}\nUser response: {}\nCheck if this response covers \
             information about any of these additional topics: {}.\nRespond with a \
             JSON object listing any additional topics covered, like \
             {{\"additional_topics\": [\"topic1\", \"topic2\"]}}. If no additional \
             topics, respond with {{\"additional_topics\": []}}",
            current_question,
            user_input,
            config.topic_keys_joined(),
        )),
    ];

    let reply = match oracle.ask(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("multi-topic detection call failed: {}", e);
            return;
        }
    };

    let known: Vec<String> = parse_additional_topics(&reply)
        .into_iter()
        .filter(|t| session.coverage().contains(t))
        .collect();
    if known.is_empty() {
        return;
    }

    for topic in &known {
        session.coverage_mut().mark(topic, true);
    }
    session.push_system(format!(
        "The user's response also provided information about these additional \
         topics: {}. Take this into account and avoid asking questions about these \
         topics if the information has already been provided.",
        known.join(", ")
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MockOracle, Role};

    fn setup() -> (Session, QuestionnaireConfig) {
        let config = QuestionnaireConfig::default();
        let session = Session::new(&config);
        (session, config)
    }

    #[test]
    fn parses_both_fields() {
        let (name, org) = parse_respondent_reply("NAME: Jane Doe, ORGANIZATION: Acme Corp");
        assert_eq!(name.as_deref(), Some("Jane Doe"));
        assert_eq!(org.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn strips_brackets_and_accepts_legacy_label() {
        let (name, org) = parse_respondent_reply("NAME: [Jane], COMPANY: [Acme]");
        assert_eq!(name.as_deref(), Some("Jane"));
        assert_eq!(org.as_deref(), Some("Acme"));
    }

    #[test]
    fn unknown_fields_map_to_none() {
        let (name, org) = parse_respondent_reply("NAME: unknown, ORGANIZATION: Acme");
        assert_eq!(name, None);
        assert_eq!(org.as_deref(), Some("Acme"));

        let (name, org) = parse_respondent_reply("no labels at all");
        assert_eq!(name, None);
        assert_eq!(org, None);
    }

    #[test]
    fn additional_topics_from_embedded_json() {
        let topics = parse_additional_topics(
            "Sure! {\"additional_topics\": [\"resources_reporting\", \"current_practices\"]} done",
        );
        assert_eq!(topics, vec!["resources_reporting", "current_practices"]);
    }

    #[test]
    fn additional_topics_malformed_is_empty() {
        assert!(parse_additional_topics("no braces here").is_empty());
        assert!(parse_additional_topics("{broken json}").is_empty());
        assert!(parse_additional_topics("{\"other_key\": []}").is_empty());
    }

    #[tokio::test]
    async fn full_extraction_overwrites_respondent() {
        let (mut session, _config) = setup();
        let oracle = MockOracle::new().with_reply("NAME: Jane Doe, ORGANIZATION: Acme Corp");

        extract_respondent(&oracle, &mut session, "Jane Doe, Acme Corp").await;

        assert_eq!(session.respondent.name, "Jane Doe");
        assert_eq!(session.respondent.organization, "Acme Corp");
        let context = session.transcript().last().unwrap();
        assert_eq!(context.role, Role::System);
        assert!(context.content.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn partial_extraction_is_destructive_and_asks_for_the_rest() {
        let (mut session, _config) = setup();
        session.respondent.organization = "Old Org".to_string();
        let oracle = MockOracle::new().with_reply("NAME: Jane, ORGANIZATION: unknown");

        extract_respondent(&oracle, &mut session, "I'm Jane").await;

        assert_eq!(session.respondent.name, "Jane");
        // Destructive merge: the unknown field wipes the prior value.
        assert_eq!(session.respondent.organization, "");
        let follow_up = session.transcript().last().unwrap();
        assert!(follow_up.content.contains("not their organization"));
    }

    #[tokio::test]
    async fn extraction_failure_is_a_noop() {
        let (mut session, _config) = setup();
        let before = session.transcript().len();
        let oracle = MockOracle::new().with_failure();

        extract_respondent(&oracle, &mut session, "Jane").await;

        assert!(session.respondent.is_empty());
        assert_eq!(session.transcript().len(), before);
    }

    #[tokio::test]
    async fn multi_topic_marks_known_keys_only() {
        let (mut session, config) = setup();
        let oracle = MockOracle::new().with_reply(
            "{\"additional_topics\": [\"emergency_contract_ops\", \"weather_ops\"]}",
        );

        detect_additional_topics(&oracle, &mut session, &config, "long answer", "Q?").await;

        assert_eq!(session.coverage().get("emergency_contract_ops"), Some(true));
        assert_eq!(session.coverage().covered_count(), 1);
        let note = session.transcript().last().unwrap();
        assert!(note.content.contains("emergency_contract_ops"));
        assert!(!note.content.contains("weather_ops"));
    }

    #[tokio::test]
    async fn multi_topic_failure_is_a_noop() {
        let (mut session, config) = setup();
        let before = session.transcript().len();
        let oracle = MockOracle::new().with_failure();

        detect_additional_topics(&oracle, &mut session, &config, "answer", "Q?").await;

        assert_eq!(session.coverage().covered_count(), 0);
        assert_eq!(session.transcript().len(), before);
    }
}
