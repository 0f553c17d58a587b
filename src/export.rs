//! Export of recorded answers to CSV and JSON.

use crate::session::Respondent;
use chrono::Local;
use serde::Serialize;

/// Structured JSON export payload.
#[derive(Debug, Serialize)]
pub struct JsonExport<'a> {
    pub user_info: UserInfoOut<'a>,
    pub submission_date: String,
    pub responses: Vec<ResponseOut<'a>>,
}

#[derive(Debug, Serialize)]
pub struct UserInfoOut<'a> {
    pub name: &'a str,
    pub company: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResponseOut<'a> {
    pub question: &'a str,
    pub answer: &'a str,
}

/// Render question-answer pairs as RFC 4180 CSV with a header row.
pub fn generate_csv(answers: &[(String, String)]) -> String {
    let mut out = String::from("Question,Answer\r\n");
    for (question, answer) in answers {
        out.push_str(&csv_field(question));
        out.push(',');
        out.push_str(&csv_field(answer));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render answers plus respondent info as pretty-printed JSON.
pub fn generate_json(
    answers: &[(String, String)],
    respondent: &Respondent,
) -> Result<String, serde_json::Error> {
    let payload = JsonExport {
        user_info: UserInfoOut {
            name: &respondent.name,
            company: &respondent.organization,
        },
        submission_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        responses: answers
            .iter()
            .map(|(q, a)| ResponseOut {
                question: q,
                answer: a,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&payload)
}
