//! Ordered rewrite rules from the `SQLite` dialect to PostgreSQL.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]
//!
//! Rules run top to bottom over the code of the statement. Several rules consume
//! the output of earlier ones, so the order of [`RULES`] is part of the
//! contract. Every rule must leave bare `?` placeholders alone in count and
//! order; numbering happens afterwards.

use super::placeholders::{is_code, opaque_spans};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Columns stored as `INTEGER` 0/1 in `SQLite` but as `BOOLEAN` in PostgreSQL.
///
/// Comparisons against `0`/`1` are rewritten only for these names. A new
/// boolean-like column must be added here or its comparisons will fail on
/// PostgreSQL with an `integer = boolean` type error.
pub const BOOLEAN_COLUMNS: &[&str] = &[
    "mfa_enabled",
    "revoked",
    "alert_triggered",
    "is_secret",
    "is_active",
];

/// How a matched span is replaced.
enum Replacement {
    /// A `regex` replacement template (`$1` style references allowed).
    Template(&'static str),
    /// A function of the captures.
    Computed(fn(&Captures<'_>) -> String),
}

/// A single named rewrite.
struct RewriteRule {
    name: &'static str,
    regex: &'static LazyLock<Regex>,
    replacement: Replacement,
}

// Column references: bare or one-level qualified (`t.col`).
macro_rules! column {
    () => {
        r"(\w+(?:\.\w+)?)"
    };
}

static NOW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdatetime\(\s*'now'\s*\)").expect("static regex: current timestamp")
});

static NOW_OFFSET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bdatetime\(\s*'now'\s*,\s*'\s*([+-]?)(\d+)\s*(days?|hours?|minutes?|months?)\s*'\s*\)",
    )
    .expect("static regex: relative timestamp")
});

static NOW_PARAM_OFFSET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdatetime\(\s*'now'\s*,\s*\?\s*\)")
        .expect("static regex: placeholder relative timestamp")
});

static DATETIME_PARAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdatetime\(\s*\?\s*\)").expect("static regex: placeholder timestamp")
});

static DATE_COLUMN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\bDATE\(\s*", column!(), r"\s*\)"))
        .expect("static regex: date of column")
});

static DATE_NOW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDATE\(\s*'now'\s*\)").expect("static regex: current date")
});

static YEAR_MONTH_COLUMN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\bstrftime\(\s*'%Y-%m'\s*,\s*", column!(), r"\s*\)"))
        .expect("static regex: year-month of column")
});

static YEAR_MONTH_PARAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bstrftime\(\s*'%Y-%m'\s*,\s*\?\s*\)")
        .expect("static regex: year-month of placeholder")
});

static YEAR_WEEK_COLUMN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\bstrftime\(\s*'%Y-W%W'\s*,\s*", column!(), r"\s*\)"))
        .expect("static regex: year-week of column")
});

static JULIANDAY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\bJULIANDAY\(\s*", column!(), r"\s*\)"))
        .expect("static regex: julian day")
});

static GROUP_CONCAT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\bGROUP_CONCAT\(\s*", column!(), r"\s*\)"))
        .expect("static regex: group concat")
});

static GROUP_CONCAT_SEP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\bGROUP_CONCAT\(\s*",
        column!(),
        r"\s*,\s*'([^']*)'\s*\)"
    ))
    .expect("static regex: group concat with separator")
});

static IFNULL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIFNULL\(").expect("static regex: ifnull"));

static BOOLEAN_COMPARE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let names = BOOLEAN_COLUMNS.join("|");
    Regex::new(&format!(
        r"(?i)\b({names})(\s*(?:!=|<>|=)\s*)([01])([^\w.]|$)"
    ))
    .expect("static regex: boolean comparison")
});

/// `INSERT OR IGNORE INTO`.
pub static INSERT_OR_IGNORE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bINSERT\s+OR\s+IGNORE\s+INTO\b").expect("static regex: insert or ignore")
});

/// `INSERT OR REPLACE INTO <table> [(<columns>)]`.
pub static INSERT_OR_REPLACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bINSERT\s+OR\s+REPLACE\s+INTO\s+"?(\w+(?:\.\w+)?)"?(?:\s*\(([^)]*)\))?"#)
        .expect("static regex: insert or replace")
});

/// Rules 1 to 14 in application order.
static RULES: &[RewriteRule] = &[
    RewriteRule {
        name: "current_timestamp",
        regex: &NOW_REGEX,
        replacement: Replacement::Template("NOW()"),
    },
    RewriteRule {
        name: "relative_timestamp",
        regex: &NOW_OFFSET_REGEX,
        replacement: Replacement::Computed(relative_timestamp),
    },
    RewriteRule {
        name: "placeholder_relative_timestamp",
        regex: &NOW_PARAM_OFFSET_REGEX,
        replacement: Replacement::Template("NOW() + CAST(? AS INTERVAL)"),
    },
    RewriteRule {
        name: "placeholder_timestamp",
        regex: &DATETIME_PARAM_REGEX,
        replacement: Replacement::Template("CAST(? AS TIMESTAMP)"),
    },
    RewriteRule {
        name: "date_of_column",
        regex: &DATE_COLUMN_REGEX,
        replacement: Replacement::Template("${1}::DATE"),
    },
    RewriteRule {
        name: "current_date",
        regex: &DATE_NOW_REGEX,
        replacement: Replacement::Template("CURRENT_DATE"),
    },
    RewriteRule {
        name: "year_month_of_column",
        regex: &YEAR_MONTH_COLUMN_REGEX,
        replacement: Replacement::Template("TO_CHAR(${1}, 'YYYY-MM')"),
    },
    RewriteRule {
        name: "year_month_of_placeholder",
        regex: &YEAR_MONTH_PARAM_REGEX,
        replacement: Replacement::Template("TO_CHAR(CAST(? AS TIMESTAMP), 'YYYY-MM')"),
    },
    RewriteRule {
        name: "year_week_of_column",
        regex: &YEAR_WEEK_COLUMN_REGEX,
        replacement: Replacement::Template("TO_CHAR(${1}, 'IYYY-\"W\"IW')"),
    },
    RewriteRule {
        name: "julian_day",
        regex: &JULIANDAY_REGEX,
        replacement: Replacement::Template("(EXTRACT(EPOCH FROM ${1}::TIMESTAMP) / 86400.0)"),
    },
    RewriteRule {
        name: "group_concat",
        regex: &GROUP_CONCAT_REGEX,
        replacement: Replacement::Template("STRING_AGG(${1}::TEXT, ',')"),
    },
    RewriteRule {
        name: "group_concat_separator",
        regex: &GROUP_CONCAT_SEP_REGEX,
        replacement: Replacement::Computed(group_concat_separator),
    },
    RewriteRule {
        name: "ifnull",
        regex: &IFNULL_REGEX,
        replacement: Replacement::Template("COALESCE("),
    },
    RewriteRule {
        name: "boolean_comparison",
        regex: &BOOLEAN_COMPARE_REGEX,
        replacement: Replacement::Computed(boolean_comparison),
    },
];

/// Applies the function and boolean rules in order.
///
/// A match is rewritten only when it starts in code. Text inside string
/// literals, quoted identifiers and comments is left as written.
pub fn apply_expression_rules(sql: &str) -> String {
    let mut out = sql.to_string();
    for rule in RULES {
        let spans = opaque_spans(&out);
        let rewritten = rule.regex.replace_all(&out, |caps: &Captures<'_>| {
            let Some(whole) = caps.get(0) else {
                return String::new();
            };
            if !is_code(&spans, whole.start()) {
                return whole.as_str().to_string();
            }
            match &rule.replacement {
                Replacement::Template(template) => {
                    let mut dst = String::new();
                    caps.expand(template, &mut dst);
                    dst
                },
                Replacement::Computed(f) => f(caps),
            }
        });
        if let Cow::Owned(next) = rewritten {
            if next != out {
                tracing::trace!(rule = rule.name, "Applied rewrite rule");
            }
            out = next;
        }
    }
    out
}

/// Returns the first match of `regex` that starts in code.
pub fn first_code_match<'h>(regex: &Regex, sql: &'h str) -> Option<Captures<'h>> {
    let spans = opaque_spans(sql);
    regex
        .captures_iter(sql)
        .find(|caps| caps.get(0).is_some_and(|m| is_code(&spans, m.start())))
}

/// `datetime('now', '-7 days')` becomes `NOW() - INTERVAL '7 days'`.
fn relative_timestamp(caps: &Captures<'_>) -> String {
    let operator = if &caps[1] == "-" { '-' } else { '+' };
    // Leading zeros are dropped so the magnitude reads as a plain integer.
    let digits = caps[2].trim_start_matches('0');
    let magnitude = if digits.is_empty() { "0" } else { digits };
    let unit = caps[3].to_lowercase();
    format!("NOW() {operator} INTERVAL '{magnitude} {unit}'")
}

fn group_concat_separator(caps: &Captures<'_>) -> String {
    format!("STRING_AGG({}::TEXT, '{}')", &caps[1], &caps[2])
}

fn boolean_comparison(caps: &Captures<'_>) -> String {
    let literal = if &caps[3] == "1" { "true" } else { "false" };
    format!("{}{}{literal}{}", &caps[1], &caps[2], &caps[4])
}
