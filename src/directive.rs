//! Directive interpreter — out-of-band instructions embedded in oracle
//! text.
//!
//! The oracle is instructed to report section coverage and summary
//! requests through two wire markers layered on top of ordinary
//! natural-language replies:
//!
//! - `TOPIC_UPDATE: {"<key>": true, ...}`, a JSON object running to the
//!   first newline after the marker
//! - `SUMMARY_REQUEST` (or the legacy `summary_requested = True`)
//!
//! Raw marker text must never surface as a normal assistant message, so
//! `apply` reports the text as handled whenever a marker matched, even
//! when the embedded JSON failed to parse. Malformed payloads are logged
//! and swallowed.

use crate::config::QuestionnaireConfig;
use crate::session::Session;
use tracing::{debug, warn};

pub const TOPIC_UPDATE_MARKER: &str = "TOPIC_UPDATE:";
pub const SUMMARY_REQUEST_MARKER: &str = "SUMMARY_REQUEST";
pub const SUMMARY_REQUEST_LEGACY: &str = "summary_requested = True";

/// A parsed out-of-band instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Section coverage report: `(key, covered)` pairs as emitted.
    TopicUpdate(Vec<(String, bool)>),
    /// The topic-update marker was present but its payload did not parse.
    /// Still handled, so the raw text is suppressed.
    MalformedTopicUpdate,
    /// The oracle judged the questionnaire ready for a summary.
    SummaryRequest,
}

/// Scan reply text for directive markers. The two markers are independent
/// and non-exclusive; both may appear in one reply.
pub fn parse_directives(text: &str) -> Vec<Directive> {
    let mut directives = Vec::new();

    if let Some(idx) = text.find(TOPIC_UPDATE_MARKER) {
        let payload = &text[idx + TOPIC_UPDATE_MARKER.len()..];
        // The oracle sometimes appends prose after the JSON object; only
        // the first line carries the payload.
        let payload = payload.lines().next().unwrap_or("").trim();
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(payload) {
            Ok(map) => {
                let pairs = map
                    .iter()
                    .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
                    .collect();
                directives.push(Directive::TopicUpdate(pairs));
            }
            Err(e) => {
                warn!("malformed topic update payload {:?}: {}", payload, e);
                directives.push(Directive::MalformedTopicUpdate);
            }
        }
    }

    if text.contains(SUMMARY_REQUEST_MARKER) || text.contains(SUMMARY_REQUEST_LEGACY) {
        directives.push(Directive::SummaryRequest);
    }

    directives
}

/// Apply any directives found in `text` to the session. Returns true when
/// a marker was matched; the caller must then keep `text` out of the
/// visible transcript.
pub fn apply(session: &mut Session, config: &QuestionnaireConfig, text: &str) -> bool {
    let directives = parse_directives(text);
    if directives.is_empty() {
        return false;
    }

    for directive in directives {
        match directive {
            Directive::TopicUpdate(pairs) => {
                for (key, covered) in pairs {
                    if session.coverage_mut().mark(&key, covered) {
                        debug!("topic {} marked {}", key, covered);
                    }
                }
                maybe_focus_nudge(session, config);
            }
            Directive::MalformedTopicUpdate => {
                // Parse failure already logged; suppress the raw text.
            }
            Directive::SummaryRequest => {
                if session.coverage().is_complete() {
                    debug!("summary request granted by directive");
                    session.request_summary();
                } else {
                    let missing = missing_titles(session, config);
                    session.push_system(format!(
                        "The user has requested a summary, but the following sections have \
                         not been covered: {}. Please inform the user that these sections \
                         need to be addressed before completing the questionnaire, and ask \
                         specifically about these sections.",
                        missing
                    ));
                }
            }
        }
    }

    true
}

/// When coverage is one section short of complete, steer the oracle toward
/// whatever is still missing. The nudge is fingerprinted by the missing
/// key set and replaces any previous nudge.
pub fn maybe_focus_nudge(session: &mut Session, config: &QuestionnaireConfig) {
    if session.coverage().covered_count() < config.near_complete_threshold() {
        return;
    }
    let missing = session.coverage().missing();
    if missing.is_empty() {
        return;
    }

    let fingerprint = missing.join(",");
    let titles = missing
        .iter()
        .map(|k| config.topic_title(k))
        .collect::<Vec<_>>()
        .join(", ");
    session.set_focus_nudge(
        format!(
            "IMPORTANT: The following sections have not been covered yet: {}. Focus \
             your next questions specifically on these sections until all are covered.",
            titles
        ),
        fingerprint,
    );
}

fn missing_titles(session: &Session, config: &QuestionnaireConfig) -> String {
    session
        .coverage()
        .missing()
        .iter()
        .map(|k| config.topic_title(k))
        .collect::<Vec<_>>()
        .join(", ")
}
