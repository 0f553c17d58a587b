//! Fixed configuration inputs: the ordered question list, the system
//! instruction blob, the closed set of topic sections, and the keyword
//! table used by the summary compiler.
//!
//! All of this is loaded once at session start and immutable thereafter.
//! Missing files fall back to built-in defaults with a warning rather
//! than aborting.

use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no questions found in {0}")]
    EmptyQuestions(String),
}

/// A thematic section of the questionnaire.
///
/// `key` is the stable identifier used in directives and snapshots;
/// `title` is the human-readable section name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicArea {
    pub key: String,
    pub title: String,
}

impl TopicArea {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
        }
    }
}

/// A summary bucket: section title plus the keywords that route a
/// question/answer pair into it. Scanned in declared order; the first
/// section with any keyword match wins.
#[derive(Debug, Clone)]
pub struct SummarySection {
    pub title: String,
    pub keywords: Vec<String>,
}

impl SummarySection {
    pub fn new(title: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            title: title.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Phrases that trigger the example path (exact match, lowercased, trimmed).
pub const EXAMPLE_PHRASES: &[&str] = &[
    "example",
    "show example",
    "give me an example",
    "example answer",
];

/// Phrases that trigger the summary path (exact match, lowercased, trimmed).
pub const SUMMARY_PHRASES: &[&str] = &[
    "summary",
    "download",
    "download summary",
    "get summary",
    "show summary",
    "yes",
    "provide summary",
];

/// Frustration phrases (substring match) that force-complete the summary.
pub const FRUSTRATION_PHRASES: &[&str] = &[
    "already answered",
    "not helpful",
    "i already responded",
    "already responded",
];

/// Bare affirmations that, in reply to a question mentioning "summary",
/// reroute into the summary path instead of advancing the pointer.
pub const AFFIRMATIONS: &[&str] = &["yes", "yeah", "sure", "ok", "okay"];

/// Greeting shown when a session starts; includes the first question.
pub const WELCOME_MESSAGE: &str = "Hello! This questionnaire is designed to help \
solution consultants better understand your organization's requirements for Crew \
Manager. If you're unsure about any question, simply type a ? and I'll provide a \
brief explanation. You can also type 'example' to see a sample response.\n\n\
Let's get started! Could you please provide your name and your organization name?";

/// The full questionnaire configuration: questions, oracle instructions,
/// topic sections, summary buckets, and the context-window policy.
#[derive(Debug, Clone)]
pub struct QuestionnaireConfig {
    /// Ordered list of question texts.
    pub questions: Vec<String>,
    /// Free-text system instruction sent as the first transcript entry.
    pub instructions: String,
    /// The closed, ordered set of topic sections.
    pub topics: Vec<TopicArea>,
    /// Keyword table for the summary compiler, in bucket order.
    pub sections: Vec<SummarySection>,
    /// When `Some(n)`, oracle calls send the system instruction plus the
    /// last `n` transcript entries. `None` sends the whole transcript.
    pub context_window: Option<usize>,
}

impl Default for QuestionnaireConfig {
    fn default() -> Self {
        Self {
            questions: default_questions(),
            instructions: default_instructions(),
            topics: default_topics(),
            sections: default_sections(),
            context_window: None,
        }
    }
}

impl QuestionnaireConfig {
    /// Build a config from question and prompt files, falling back to the
    /// built-in defaults for whichever file is missing.
    pub fn from_files(questions_path: &Path, prompt_path: &Path) -> Self {
        let questions = match load_questions(questions_path) {
            Ok(qs) => qs,
            Err(e) => {
                warn!("could not load questions from {}: {}", questions_path.display(), e);
                default_questions()
            }
        };
        let instructions = match load_instructions(prompt_path) {
            Ok(text) => text,
            Err(e) => {
                warn!("could not load prompt from {}: {}", prompt_path.display(), e);
                default_instructions()
            }
        };
        Self {
            questions,
            instructions,
            ..Self::default()
        }
    }

    /// Near-completion threshold: all sections but one.
    pub fn near_complete_threshold(&self) -> usize {
        self.topics.len().saturating_sub(1)
    }

    /// Display title for a topic key, falling back to the key itself for
    /// unknown keys (which should not normally be rendered at all).
    pub fn topic_title<'a>(&'a self, key: &'a str) -> &'a str {
        self.topics
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.title.as_str())
            .unwrap_or(key)
    }

    /// Comma-joined list of the known topic keys, for extraction prompts.
    pub fn topic_keys_joined(&self) -> String {
        self.topics
            .iter()
            .map(|t| t.key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Load questions from a text file, one per line, stripping a leading
/// `"N. "` number prefix when present and skipping blank lines.
pub fn load_questions(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut questions = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(". ") {
            Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_digit()) => {
                questions.push(rest.to_string());
            }
            _ => questions.push(line.to_string()),
        }
    }
    if questions.is_empty() {
        return Err(ConfigError::EmptyQuestions(path.display().to_string()));
    }
    Ok(questions)
}

/// Load the oracle instruction blob from a text file.
pub fn load_instructions(path: &Path) -> Result<String, ConfigError> {
    Ok(std::fs::read_to_string(path)?)
}

fn default_topics() -> Vec<TopicArea> {
    vec![
        TopicArea::new("crew_manager_usage", "Section 1: Crew Manager Usage"),
        TopicArea::new(
            "emergency_contract_ops",
            "Section 2: Emergency and Contract Operations",
        ),
        TopicArea::new("resources_reporting", "Section 3: Resources and Reporting"),
        TopicArea::new(
            "current_practices",
            "Section 4: Current Practices and Needs",
        ),
    ]
}

fn default_sections() -> Vec<SummarySection> {
    vec![
        SummarySection::new(
            "Section 1: Crew Manager Usage",
            &[
                "daily crew",
                "daily resource",
                "work assignments",
                "situation",
            ],
        ),
        SummarySection::new(
            "Section 2: Emergency and Contract Operations",
            &["mutual assistance", "contract crews", "lodging", "emergency"],
        ),
        SummarySection::new(
            "Section 3: Resources and Reporting",
            &[
                "additional crew",
                "tracking crew",
                "crew manager usage",
                "resources",
                "availability",
            ],
        ),
        SummarySection::new(
            "Section 4: Current Practices and Needs",
            &[
                "current crew",
                "crew management reporting",
                "data organization",
                "reports",
                "tools",
            ],
        ),
    ]
}

fn default_instructions() -> String {
    "You are an assistant conducting a questionnaire about crew management. \
Ask one question at a time and keep the respondent on topic. When asked which \
sections have been covered, reply with a single line of the form \
TOPIC_UPDATE: {\"<section_key>\": true, ...} covering all section keys. When \
the respondent has covered every section and asks to finish, reply with \
SUMMARY_REQUEST."
        .to_string()
}

fn default_questions() -> Vec<String> {
    [
        "Could you please provide your name and your organization name?",
        "In what situations will crew management be used by your organization?",
        "How frequently will you use crew management?",
        "How are you currently managing daily crew assignments?",
        "What information is needed for daily operations of crews?",
        "How do you manage daily resource assignments?",
        "How are resources like equipment or vehicles allocated to crews or members?",
        "How are you currently assigning work to a crew or member?",
        "How are you assigning mutual assistance crews?",
        "What is your approach to obtaining these crews during high-demand scenarios?",
        "How are you assigning contract crews?",
        "What is your approach to obtaining contractors for operations?",
        "How are you assigning lodging?",
        "What are your special considerations for lodging?",
        "What additional crew, crew member or resources do you track?",
        "How are crews or resources managed when not assigned to a crew?",
        "How are you currently tracking crew member availability?",
        "Who in your organization will be using Crew Manager?",
        "What are their roles and specific needs?",
        "Describe how your current crew management tools are used.",
        "What reports are currently printed and distributed?",
        "How would you like data to be organized or filtered?",
        "Would you like a summary of your responses?",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}
