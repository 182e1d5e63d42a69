//! Table-driven tests for archive and attempt filename templates.

use chrono::{DateTime, TimeZone, Utc};

use quiz_archiver::filename::{
    generate_archive_filename, generate_attempt_filename, is_valid_archive_pattern,
    is_valid_attempt_pattern, AttemptInfo, CourseInfo, QuizInfo, UserInfo, ARCHIVE_VARIABLES,
    ATTEMPT_VARIABLES, FORBIDDEN_CHARACTERS,
};

/// Represents a single template validation test case.
struct PatternTestCase {
    name: &'static str,
    pattern: &'static str,
    valid_for_archive: bool,
    valid_for_attempt: bool,
}

const PATTERN_TESTS: &[PatternTestCase] = &[
    PatternTestCase {
        name: "default_archive",
        pattern: "quiz-archive-${courseshortname}-${courseid}-${quizname}-${quizid}_${date}-${time}",
        valid_for_archive: true,
        valid_for_attempt: true,
    },
    PatternTestCase {
        name: "default_attempt",
        pattern: "${attemptid}-${username}_${date}-${time}",
        valid_for_archive: false,
        valid_for_attempt: true,
    },
    PatternTestCase {
        name: "literal_only",
        pattern: "archive",
        valid_for_archive: true,
        valid_for_attempt: true,
    },
    PatternTestCase {
        name: "whitespace_inside_braces",
        pattern: "${ quizid }",
        valid_for_archive: true,
        valid_for_attempt: true,
    },
    PatternTestCase {
        name: "unknown_variable",
        pattern: "${quizid}-${secret}",
        valid_for_archive: false,
        valid_for_attempt: false,
    },
    PatternTestCase {
        name: "bare_dollar",
        pattern: "price$",
        valid_for_archive: false,
        valid_for_attempt: false,
    },
    PatternTestCase {
        name: "unclosed_placeholder",
        pattern: "${quizid",
        valid_for_archive: false,
        valid_for_attempt: false,
    },
    PatternTestCase {
        name: "path_separator",
        pattern: "${courseid}/${quizid}",
        valid_for_archive: false,
        valid_for_attempt: false,
    },
    PatternTestCase {
        name: "extension_dot",
        pattern: "${quizid}.tar",
        valid_for_archive: false,
        valid_for_attempt: false,
    },
    PatternTestCase {
        name: "case_sensitive_variable",
        pattern: "${QuizId}",
        valid_for_archive: false,
        valid_for_attempt: false,
    },
];

#[test]
fn test_pattern_validation() {
    for case in PATTERN_TESTS {
        assert_eq!(
            is_valid_archive_pattern(case.pattern),
            case.valid_for_archive,
            "archive validation of '{}' ({})",
            case.pattern,
            case.name
        );
        assert_eq!(
            is_valid_attempt_pattern(case.pattern),
            case.valid_for_attempt,
            "attempt validation of '{}' ({})",
            case.pattern,
            case.name
        );
    }
}

fn course() -> CourseInfo {
    CourseInfo {
        id: 2,
        fullname: "Systems: Part 1".to_string(),
        shortname: "SYS.1".to_string(),
    }
}

fn quiz() -> QuizInfo {
    QuizInfo {
        id: 7,
        cm_id: 15,
        name: "Midterm?!".to_string(),
    }
}

fn attempt() -> AttemptInfo {
    AttemptInfo {
        id: 42,
        time_start: 1_700_000_000,
        time_finish: Some(1_700_003_600),
    }
}

fn user() -> UserInfo {
    UserInfo {
        username: "j.doe".to_string(),
        firstname: "Jane".to_string(),
        lastname: "Doe".to_string(),
        idnumber: "S<1>".to_string(),
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 1).unwrap()
}

#[test]
fn test_every_archive_variable_expands_without_forbidden_characters() {
    for var in ARCHIVE_VARIABLES {
        let pattern = format!("x-${{{}}}-y", var);
        let name = generate_archive_filename(&course(), &quiz(), &pattern, now()).unwrap();
        assert!(
            !name.contains(FORBIDDEN_CHARACTERS),
            "{} produced {}",
            var,
            name
        );
        assert!(!name.contains('$'), "{} was not expanded: {}", var, name);
    }
}

#[test]
fn test_every_attempt_variable_expands_without_forbidden_characters() {
    for var in ATTEMPT_VARIABLES {
        let pattern = format!("${{{}}}", var);
        let name =
            generate_attempt_filename(&course(), &quiz(), &attempt(), &user(), &pattern, now())
                .unwrap();
        assert!(
            !name.contains(FORBIDDEN_CHARACTERS),
            "{} produced {}",
            var,
            name
        );
        assert!(!name.contains('$'), "{} was not expanded: {}", var, name);
    }
}

#[test]
fn test_expansion_values() {
    let name = generate_archive_filename(
        &course(),
        &quiz(),
        "${coursename}_${courseshortname}_${quizname}_${cmid}_${date}_${time}",
        now(),
    )
    .unwrap();
    assert_eq!(name, "Systems Part 1_SYS1_Midterm_15_2024-12-31_23-59-01");

    let name = generate_attempt_filename(
        &course(),
        &quiz(),
        &attempt(),
        &user(),
        "${attemptid}-${username}-${firstname}-${idnumber}-${timefinish}",
        now(),
    )
    .unwrap();
    assert_eq!(name, "42-jdoe-Jane-S1-1700003600");
}

#[test]
fn test_invalid_templates_are_rejected_by_generators() {
    assert!(generate_archive_filename(&course(), &quiz(), "${attemptid}", now())
        .unwrap_err()
        .to_string()
        .contains("invalid archive filename pattern"));
    assert!(
        generate_attempt_filename(&course(), &quiz(), &attempt(), &user(), "${x}", now()).is_err()
    );
}
