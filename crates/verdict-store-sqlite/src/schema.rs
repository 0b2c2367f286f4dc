//! SQL schema for the Verdict SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Every collection shares one table. The body is a JSON object; counters
-- inside it are only ever changed by single-statement upserts.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,
    doc_id      TEXT NOT NULL,
    body        TEXT NOT NULL CHECK (json_valid(body)),
    created_at  TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (collection, doc_id)
);

-- Audit records are strictly append-only.
CREATE TABLE IF NOT EXISTS audit_log (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id        TEXT NOT NULL UNIQUE,
    message_id      TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    reviewer        TEXT NOT NULL,
    direction       TEXT NOT NULL,   -- 'fraud_to_safe' | 'safe_to_fraud'
    reason          TEXT NOT NULL,
    previous_status TEXT NOT NULL,
    new_status      TEXT NOT NULL,
    targets         TEXT NOT NULL,   -- JSON array of step names
    failed_steps    TEXT NOT NULL,   -- JSON array of step names
    outcome         TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE INDEX IF NOT EXISTS audit_message_idx ON audit_log(message_id, user_id);

PRAGMA user_version = 1;
";
