//! Summary compiler: turns recorded answers into a sectioned Markdown
//! document.
//!
//! The recorded answer list is authoritative. Only when it is empty (a
//! restored snapshot that predates answer tracking) does the compiler fall
//! back to walking the visible transcript and pairing questions with the
//! user messages that follow them.

use crate::config::{QuestionnaireConfig, EXAMPLE_PHRASES};
use crate::oracle::Role;
use crate::session::Session;
use chrono::Local;
use std::fmt::Write as _;

const OTHER_SECTION: &str = "Other";

/// Compile the full Markdown summary for a session.
pub fn compile(session: &Session, config: &QuestionnaireConfig) -> String {
    let pairs = if session.answers().is_empty() {
        derive_pairs(session)
    } else {
        session.answers().to_vec()
    };

    let mut out = String::from("# Questionnaire Summary\n\n");
    let _ = writeln!(out, "Date: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));

    if !session.respondent.is_empty() {
        out.push_str("## Respondent\n");
        if !session.respondent.name.is_empty() {
            let _ = writeln!(out, "Name: {}", session.respondent.name);
        }
        if !session.respondent.organization.is_empty() {
            let _ = writeln!(out, "Organization: {}", session.respondent.organization);
        }
        out.push('\n');
    }

    out.push_str("## Questionnaire Responses\n\n");

    for (title, bucket) in bucket_pairs(&pairs, config) {
        if bucket.is_empty() {
            continue;
        }
        let _ = writeln!(out, "### {}\n", title);
        for (question, answer) in bucket {
            let _ = writeln!(out, "**Q: {}**\n", question);
            let _ = writeln!(out, "A: {}\n", answer);
        }
    }

    out
}

/// Route each pair into the first section whose keyword appears in the
/// combined question-and-answer text; unmatched pairs land in "Other".
/// Buckets come back in declaration order with "Other" last.
fn bucket_pairs<'a>(
    pairs: &[(String, String)],
    config: &'a QuestionnaireConfig,
) -> Vec<(&'a str, Vec<(String, String)>)> {
    let mut buckets: Vec<(&str, Vec<(String, String)>)> = config
        .sections
        .iter()
        .map(|s| (s.title.as_str(), Vec::new()))
        .collect();
    buckets.push((OTHER_SECTION, Vec::new()));

    for (question, answer) in pairs {
        let combined = format!("{} {}", question, answer).to_lowercase();
        let slot = config
            .sections
            .iter()
            .position(|s| s.keywords.iter().any(|k| combined.contains(k.as_str())))
            .unwrap_or(buckets.len() - 1);
        buckets[slot].1.push((question.clone(), answer.clone()));
    }

    buckets
}

/// Fallback pairing: walk the visible transcript, remembering the most
/// recent question the assistant asked and attaching the next user message
/// to it. Example requests are skipped on both sides.
fn derive_pairs(session: &Session) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut pending: Option<String> = None;

    for message in session.visible() {
        match message.role {
            Role::Assistant if message.content.contains('?') => {
                if let Some(q) = question_in(&message.content) {
                    pending = Some(q);
                }
            }
            Role::User => {
                let lowered = message.content.trim().to_lowercase();
                if EXAMPLE_PHRASES.contains(&lowered.as_str()) {
                    continue;
                }
                if let Some(question) = pending.take() {
                    pairs.push((question, message.content.clone()));
                }
            }
            _ => {}
        }
    }

    pairs
}

/// Pull the actual question out of an assistant message. Example replies
/// carry the question after the `*Example:` block; plain replies get the
/// last sentence containing a question mark.
fn question_in(content: &str) -> Option<String> {
    if let Some((_, after)) = content.split_once("*Example:") {
        return after
            .lines()
            .find(|line| line.contains('?') && !line.trim_start().starts_with("*Example:"))
            .map(|line| line.trim().to_string());
    }

    content
        .rsplit(". ")
        .find(|sentence| sentence.contains('?'))
        .map(|sentence| sentence.trim().to_string())
}
