//! `SQLite` to PostgreSQL statement translation.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]
//!
//! The translator is rule-based, not a parser. Each call classifies the
//! statement first: schema definition, `ALTER TABLE` and `PRAGMA` statements
//! are valid but meaningless against an externally migrated server, so they
//! become [`Translation::NoOp`]. Everything else goes through the ordered
//! expression rules in [`rules`], then upsert shorthands, then placeholder
//! numbering, then the conflict clause.
//!
//! Unrecognized constructs pass through untouched apart from placeholder
//! numbering. The translator never fails.

mod placeholders;
mod rules;

pub use placeholders::{count_placeholders, number_placeholders};
pub use rules::BOOLEAN_COLUMNS;

use crate::observability::record_translation;
use placeholders::{is_code, opaque_spans};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Why a statement was skipped on the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// `CREATE TABLE` or `CREATE [UNIQUE] INDEX`.
    SchemaDefinition,
    /// `ALTER TABLE`.
    AlterTable,
    /// `PRAGMA`.
    Pragma,
}

impl NoOpReason {
    /// Returns the reason as a short label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaDefinition => "schema_definition",
            Self::AlterTable => "alter_table",
            Self::Pragma => "pragma",
        }
    }
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of translating one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Text ready to execute, with the number of positional placeholders it
    /// consumes.
    Statement {
        /// Statement text in the target dialect.
        sql: String,
        /// Positional placeholder count.
        placeholders: usize,
    },
    /// Valid input that is intentionally not executed on this backend.
    NoOp(NoOpReason),
}

impl Translation {
    /// Wraps text that needs no rewriting.
    #[must_use]
    pub fn passthrough(sql: &str) -> Self {
        Self::Statement {
            sql: sql.to_string(),
            placeholders: count_placeholders(sql),
        }
    }

    /// Returns the statement text, or `None` for a no-op.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } => Some(sql),
            Self::NoOp(_) => None,
        }
    }

    /// Returns the placeholder count. Zero for a no-op.
    #[must_use]
    pub const fn placeholders(&self) -> usize {
        match self {
            Self::Statement { placeholders, .. } => *placeholders,
            Self::NoOp(_) => 0,
        }
    }

    /// Returns true for a no-op.
    #[must_use]
    pub const fn is_no_op(&self) -> bool {
        matches!(self, Self::NoOp(_))
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Statement { sql, .. } => f.write_str(sql),
            Self::NoOp(reason) => write!(f, "NO_OP ({reason})"),
        }
    }
}

/// Rewrites a statement for a target engine.
///
/// Implementations must be pure: same input, same output, no I/O beyond
/// logging.
pub trait SqlRewriter: Send + Sync {
    /// Translates one statement.
    fn rewrite(&self, sql: &str) -> Translation;
}

static SCHEMA_DEFINITION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*CREATE\s+(?:UNIQUE\s+)?(?:TABLE|INDEX)\b")
        .expect("static regex: schema definition")
});

static ALTER_TABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*ALTER\s+TABLE\b").expect("static regex: alter table")
});

static PRAGMA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*PRAGMA\b").expect("static regex: pragma"));

static RETURNING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRETURNING\b").expect("static regex: returning"));

/// Conflict handling appended after numbering.
enum ConflictClause {
    None,
    DoNothing,
    Upsert(String),
}

/// The PostgreSQL dialect.
///
/// Optionally carries conflict-target columns per table. With a target
/// registered, `INSERT OR REPLACE INTO t (...)` keeps its replace semantics
/// as `ON CONFLICT (target) DO UPDATE`. Without one it degrades to a plain
/// insert and logs a warning.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect {
    conflict_targets: BTreeMap<String, Vec<String>>,
}

impl PostgresDialect {
    /// Creates a dialect with no conflict targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dialect from a table to key-columns map.
    #[must_use]
    pub fn with_conflict_targets(conflict_targets: BTreeMap<String, Vec<String>>) -> Self {
        let conflict_targets = conflict_targets
            .into_iter()
            .map(|(table, cols)| (table.to_lowercase(), cols))
            .collect();
        Self { conflict_targets }
    }

    /// Registers conflict-target columns for one table.
    #[must_use]
    pub fn with_conflict_target<I, S>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_targets.insert(
            table.to_lowercase(),
            columns.into_iter().map(Into::into).collect(),
        );
        self
    }

    fn classify(sql: &str) -> Option<NoOpReason> {
        if SCHEMA_DEFINITION_REGEX.is_match(sql) {
            tracing::warn!(
                statement = %preview(sql),
                "DDL statement skipped on client/server backend; schema is owned by migrations"
            );
            Some(NoOpReason::SchemaDefinition)
        } else if ALTER_TABLE_REGEX.is_match(sql) {
            Some(NoOpReason::AlterTable)
        } else if PRAGMA_REGEX.is_match(sql) {
            Some(NoOpReason::Pragma)
        } else {
            None
        }
    }

    fn rewrite_upserts(&self, sql: &str) -> (String, ConflictClause) {
        if let Some(m) = rules::first_code_match(&rules::INSERT_OR_IGNORE_REGEX, sql).and_then(|c| c.get(0)) {
            let rewritten = format!("{}INSERT INTO{}", &sql[..m.start()], &sql[m.end()..]);
            return (rewritten, ConflictClause::DoNothing);
        }

        let Some(caps) = rules::first_code_match(&rules::INSERT_OR_REPLACE_REGEX, sql) else {
            return (sql.to_string(), ConflictClause::None);
        };
        let Some(head) = caps.get(0) else {
            return (sql.to_string(), ConflictClause::None);
        };
        let table = caps[1].to_string();
        let columns: Vec<String> = caps
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|c| c.trim().trim_matches('"').to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let clause = match self.conflict_targets.get(&table.to_lowercase()) {
            Some(keys) if !columns.is_empty() => ConflictClause::Upsert(upsert_clause(keys, &columns)),
            Some(_) => {
                tracing::warn!(
                    table = %table,
                    "INSERT OR REPLACE without a column list cannot be upserted; inserting plainly"
                );
                ConflictClause::None
            },
            None => {
                tracing::warn!(
                    table = %table,
                    "No conflict target registered; INSERT OR REPLACE becomes a plain INSERT"
                );
                ConflictClause::None
            },
        };

        let text = head.as_str();
        let into_at = text.to_ascii_lowercase().find("into").unwrap_or(0);
        let rewritten = format!(
            "{}INSERT {}{}",
            &sql[..head.start()],
            &text[into_at..],
            &sql[head.end()..]
        );
        (rewritten, clause)
    }
}

impl SqlRewriter for PostgresDialect {
    fn rewrite(&self, sql: &str) -> Translation {
        if let Some(reason) = Self::classify(sql) {
            record_translation("no_op");
            return Translation::NoOp(reason);
        }

        let expressions = rules::apply_expression_rules(sql);
        let (statement, conflict) = self.rewrite_upserts(&expressions);
        let (numbered, placeholders) = number_placeholders(&statement);

        let sql = match conflict {
            ConflictClause::None => numbered,
            ConflictClause::DoNothing => append_conflict_clause(&numbered, "ON CONFLICT DO NOTHING"),
            ConflictClause::Upsert(clause) => append_conflict_clause(&numbered, &clause),
        };

        record_translation("statement");
        Translation::Statement { sql, placeholders }
    }
}

/// Translates a statement with the default PostgreSQL dialect.
#[must_use]
pub fn translate(sql: &str) -> Translation {
    PostgresDialect::default().rewrite(sql)
}

fn upsert_clause(keys: &[String], columns: &[String]) -> String {
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !keys.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();
    let target = keys.join(", ");
    if updates.is_empty() {
        format!("ON CONFLICT ({target}) DO NOTHING")
    } else {
        format!("ON CONFLICT ({target}) DO UPDATE SET {}", updates.join(", "))
    }
}

/// Places a conflict clause at the end of the statement, ahead of a trailing
/// `RETURNING` clause and after dropping a trailing semicolon.
fn append_conflict_clause(sql: &str, clause: &str) -> String {
    let body = sql.trim_end().trim_end_matches(';').trim_end();
    let spans = opaque_spans(body);
    match RETURNING_REGEX
        .find_iter(body)
        .filter(|m| is_code(&spans, m.start()))
        .last()
    {
        Some(m) => {
            let (head, returning) = body.split_at(m.start());
            format!("{} {clause} {returning}", head.trim_end())
        },
        None => format!("{body} {clause}"),
    }
}

/// First 80 characters of a statement, for log lines.
pub(crate) fn preview(sql: &str) -> String {
    sql.trim().chars().take(80).collect()
}
