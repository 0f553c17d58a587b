//! Intake: Conversational Questionnaire Assistant
//!
//! Drives a fixed list of questionnaire items through an LLM-backed chat
//! loop, tracks which thematic sections of the questionnaire have been
//! substantively covered, and compiles a structured summary once coverage
//! is complete.
//!
//! # Core Concepts
//!
//! - **Session**: the single long-lived aggregate holding the transcript,
//!   the question pointer, recorded answers, and coverage state
//! - **Coverage ledger**: a fixed map of section keys to covered flags,
//!   the source of truth for "is the questionnaire done"
//! - **Oracle**: the external LLM completion service, reached through a
//!   trait so tests can script replies
//! - **Directives**: out-of-band instructions embedded in oracle text
//!   (topic-coverage reports, summary requests), parsed into typed variants
//!
//! # Example
//!
//! ```
//! use intake::{QuestionnaireConfig, Session};
//!
//! let config = QuestionnaireConfig::default();
//! let session = Session::new(&config);
//! assert!(!session.coverage().is_complete());
//! ```

pub mod config;
pub mod controller;
pub mod coverage;
pub mod directive;
pub mod export;
pub mod extract;
pub mod notify;
pub mod oracle;
pub mod session;
pub mod summary;

pub use config::{ConfigError, QuestionnaireConfig, SummarySection, TopicArea};
pub use controller::{ConversationController, FinalizeError, TurnError, TurnOutcome};
pub use coverage::CoverageLedger;
pub use notify::{CompletionNotice, LogNotifier, Notifier, NotifyError};
pub use oracle::{ChatMessage, MockOracle, OpenAiOracle, Oracle, OracleError, Role};
pub use session::{Respondent, Session, SessionSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
