//! `${variable}` filename templates for archives and attempt reports.
//!
//! A template is valid when it contains none of [`FORBIDDEN_CHARACTERS`] and no
//! `$` remains once every allowed `${var}` placeholder (whitespace inside the
//! braces tolerated) has been stripped from it. Expansion replaces the exact
//! `${var}` spelling of each variable and then strips forbidden characters
//! from the result.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{ArchiverError, Result};

/// Characters that never survive into a generated filename.
pub const FORBIDDEN_CHARACTERS: &[char] = &[
    '\\', '/', '.', ':', ';', '*', '?', '!', '"', '<', '>', '|', '\0',
];

/// Variables available in archive filename templates.
pub const ARCHIVE_VARIABLES: &[&str] = &[
    "courseid",
    "cmid",
    "quizid",
    "coursename",
    "courseshortname",
    "quizname",
    "timestamp",
    "date",
    "time",
];

/// Variables available in attempt filename templates.
pub const ATTEMPT_VARIABLES: &[&str] = &[
    "courseid",
    "cmid",
    "quizid",
    "coursename",
    "courseshortname",
    "quizname",
    "timestamp",
    "date",
    "time",
    "attemptid",
    "username",
    "firstname",
    "lastname",
    "idnumber",
    "timestart",
    "timefinish",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Archive,
    Attempt,
}

impl PatternKind {
    pub fn variables(self) -> &'static [&'static str] {
        match self {
            PatternKind::Archive => ARCHIVE_VARIABLES,
            PatternKind::Attempt => ATTEMPT_VARIABLES,
        }
    }

    fn placeholder_regex(self) -> &'static Regex {
        static ARCHIVE: OnceLock<Regex> = OnceLock::new();
        static ATTEMPT: OnceLock<Regex> = OnceLock::new();
        let cell = match self {
            PatternKind::Archive => &ARCHIVE,
            PatternKind::Attempt => &ATTEMPT,
        };
        cell.get_or_init(|| {
            let alternatives = self.variables().join("|");
            Regex::new(&format!(r"\$\{{\s*(?:{})\s*\}}", alternatives))
                .unwrap_or_else(|e| unreachable!("static placeholder regex: {}", e))
        })
    }
}

#[derive(Debug, Clone)]
pub struct CourseInfo {
    pub id: i64,
    pub fullname: String,
    pub shortname: String,
}

#[derive(Debug, Clone)]
pub struct QuizInfo {
    pub id: i64,
    pub cm_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AttemptInfo {
    pub id: i64,
    /// Unix timestamps.
    pub time_start: i64,
    pub time_finish: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UserInfo {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub idnumber: String,
}

/// Checks a template against the variable allow-list of `kind`.
pub fn is_valid_pattern(pattern: &str, kind: PatternKind) -> bool {
    if pattern.contains(FORBIDDEN_CHARACTERS) {
        return false;
    }

    let residue = kind.placeholder_regex().replace_all(pattern, "");
    !residue.contains('$')
}

pub fn is_valid_archive_pattern(pattern: &str) -> bool {
    is_valid_pattern(pattern, PatternKind::Archive)
}

pub fn is_valid_attempt_pattern(pattern: &str) -> bool {
    is_valid_pattern(pattern, PatternKind::Attempt)
}

/// Builds the filename of a quiz archive.
pub fn generate_archive_filename(
    course: &CourseInfo,
    quiz: &QuizInfo,
    pattern: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    if !is_valid_archive_pattern(pattern) {
        return Err(ArchiverError::InvalidInput(format!(
            "invalid archive filename pattern '{}'",
            pattern
        )));
    }

    Ok(expand(pattern, &archive_variables(course, quiz, now)))
}

/// Builds the filename of a single attempt report.
pub fn generate_attempt_filename(
    course: &CourseInfo,
    quiz: &QuizInfo,
    attempt: &AttemptInfo,
    user: &UserInfo,
    pattern: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    if !is_valid_attempt_pattern(pattern) {
        return Err(ArchiverError::InvalidInput(format!(
            "invalid attempt filename pattern '{}'",
            pattern
        )));
    }

    let mut vars = archive_variables(course, quiz, now);
    vars.insert("attemptid", attempt.id.to_string());
    vars.insert("username", user.username.clone());
    vars.insert("firstname", user.firstname.clone());
    vars.insert("lastname", user.lastname.clone());
    vars.insert("idnumber", user.idnumber.clone());
    vars.insert("timestart", attempt.time_start.to_string());
    vars.insert(
        "timefinish",
        attempt.time_finish.map(|t| t.to_string()).unwrap_or_default(),
    );

    Ok(expand(pattern, &vars))
}

/// Removes every forbidden character.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_CHARACTERS.contains(c))
        .collect()
}

fn archive_variables(
    course: &CourseInfo,
    quiz: &QuizInfo,
    now: DateTime<Utc>,
) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("courseid", course.id.to_string());
    vars.insert("cmid", quiz.cm_id.to_string());
    vars.insert("quizid", quiz.id.to_string());
    vars.insert("coursename", course.fullname.clone());
    vars.insert("courseshortname", course.shortname.clone());
    vars.insert("quizname", quiz.name.clone());
    vars.insert("timestamp", now.timestamp().to_string());
    vars.insert("date", now.format("%Y-%m-%d").to_string());
    vars.insert("time", now.format("%H-%M-%S").to_string());
    vars
}

fn expand(pattern: &str, vars: &BTreeMap<&'static str, String>) -> String {
    let mut result = pattern.to_string();
    for (name, value) in vars {
        result = result.replace(&format!("${{{}}}", name), value);
    }
    sanitize_filename(&result)
}
