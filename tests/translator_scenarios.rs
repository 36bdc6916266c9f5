//! End-to-end translator scenarios.
//!
//! Each case feeds one `SQLite` statement through the public translator and
//! checks the exact `PostgreSQL` text, or the no-op classification.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use test_case::test_case;
use trustdb::{NoOpReason, PostgresDialect, SqlRewriter, Translation, translate};

fn sql_of(translation: &Translation) -> &str {
    translation.sql().expect("statement, not a no-op")
}

#[test]
fn insert_or_ignore_gets_do_nothing_and_numbered_placeholders() {
    let out = translate("INSERT OR IGNORE INTO users (id, email) VALUES (?, ?)");
    assert_eq!(
        sql_of(&out),
        "INSERT INTO users (id, email) VALUES ($1, $2) ON CONFLICT DO NOTHING"
    );
    assert_eq!(out.placeholders(), 2);
}

#[test]
fn allow_listed_boolean_is_rewritten() {
    let out = translate("SELECT * FROM sessions WHERE revoked = 1");
    assert_eq!(sql_of(&out), "SELECT * FROM sessions WHERE revoked = true");
}

#[test_case("SELECT * FROM t WHERE retries = 1" ; "decoy column equals one")]
#[test_case("SELECT * FROM t WHERE archived = 0" ; "decoy column equals zero")]
#[test_case("SELECT * FROM t WHERE revoked_count = 1" ; "allow-listed prefix")]
#[test_case("SELECT * FROM t WHERE not_revoked = 0" ; "allow-listed suffix")]
fn decoy_boolean_comparisons_are_untouched(sql: &str) {
    assert_eq!(sql_of(&translate(sql)), sql);
}

#[test_case("CREATE INDEX IF NOT EXISTS idx_x ON t(c)", NoOpReason::SchemaDefinition ; "create index")]
#[test_case("create table if not exists t (id TEXT)", NoOpReason::SchemaDefinition ; "create table lowercase")]
#[test_case("  ALTER TABLE users ADD COLUMN mfa_secret TEXT", NoOpReason::AlterTable ; "alter with indent")]
#[test_case("PRAGMA journal_mode = WAL", NoOpReason::Pragma ; "pragma")]
fn schema_statements_are_no_ops(sql: &str, reason: NoOpReason) {
    assert_eq!(translate(sql), Translation::NoOp(reason));
}

#[test]
fn unrecognised_text_only_gets_placeholders_renumbered() {
    let out = translate("SELECT custom_fn(?, 'a?b') FROM widgets WHERE x = ?");
    assert_eq!(sql_of(&out), "SELECT custom_fn($1, 'a?b') FROM widgets WHERE x = $2");
    assert_eq!(out.placeholders(), 2);
}

#[test]
fn conflict_clause_lands_before_returning() {
    let out = translate("INSERT OR IGNORE INTO users (id) VALUES (?) RETURNING id;");
    assert_eq!(
        sql_of(&out),
        "INSERT INTO users (id) VALUES ($1) ON CONFLICT DO NOTHING RETURNING id"
    );
}

#[test]
fn insert_or_replace_uses_registered_conflict_target() {
    let dialect = PostgresDialect::new().with_conflict_target("system_settings", ["category", "setting_key"]);
    let out = dialect.rewrite(
        "INSERT OR REPLACE INTO system_settings (id, category, setting_key, setting_value) VALUES (?, ?, ?, ?)",
    );
    assert_eq!(
        sql_of(&out),
        "INSERT INTO system_settings (id, category, setting_key, setting_value) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (category, setting_key) DO UPDATE SET id = EXCLUDED.id, setting_value = EXCLUDED.setting_value"
    );
}

#[test]
fn insert_or_replace_without_target_becomes_plain_insert() {
    let out = translate("INSERT OR REPLACE INTO sessions (id, user_id) VALUES (?, ?)");
    assert_eq!(sql_of(&out), "INSERT INTO sessions (id, user_id) VALUES ($1, $2)");
}

#[test]
fn display_shows_no_op_reason() {
    assert_eq!(translate("PRAGMA foreign_keys = ON").to_string(), "NO_OP (pragma)");
}
