//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` and run on
//! every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS owner (
    id                  TEXT PRIMARY KEY NOT NULL,
    transport_chat_id   TEXT NOT NULL UNIQUE,
    display_name        TEXT,
    home_location       TEXT,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task (
    id                  TEXT PRIMARY KEY NOT NULL,
    owner_id            TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    priority            TEXT NOT NULL CHECK(priority IN ('low','medium','high','urgent')),
    status              TEXT NOT NULL CHECK(status IN ('pending','in_progress','completed','cancelled','snoozed')),
    due_at              TEXT NOT NULL,
    snoozed_until       TEXT,
    reminder_count      INTEGER NOT NULL DEFAULT 0,
    last_reminded_at    TEXT,
    completed_at        TEXT,
    batch_id            TEXT,
    location            TEXT,
    source_message      TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reminder (
    id                  TEXT PRIMARY KEY NOT NULL,
    task_id             TEXT NOT NULL,
    sequence            INTEGER NOT NULL,
    channel             TEXT NOT NULL,
    status              TEXT NOT NULL CHECK(status IN ('scheduled','sent','delivered','failed','acknowledged')),
    scheduled_at        TEXT NOT NULL,
    sent_at             TEXT,
    acknowledged_at     TEXT,
    message_content     TEXT NOT NULL,
    error_message       TEXT,
    channel_message_id  TEXT
);

CREATE TABLE IF NOT EXISTS idempotency_record (
    external_id         TEXT NOT NULL,
    direction           TEXT NOT NULL CHECK(direction IN ('incoming','outgoing')),
    holder              TEXT,
    processed           INTEGER NOT NULL DEFAULT 0,
    response            TEXT,
    created_at          TEXT NOT NULL,
    PRIMARY KEY (external_id, direction)
);

CREATE TABLE IF NOT EXISTS pending_batch (
    id                  TEXT PRIMARY KEY NOT NULL,
    owner_id            TEXT NOT NULL,
    drafts              TEXT NOT NULL,
    source_message      TEXT NOT NULL,
    active              INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL,
    consumed_at         TEXT
);

CREATE TABLE IF NOT EXISTS scheduled_job (
    id                  TEXT PRIMARY KEY NOT NULL,
    kind                TEXT NOT NULL CHECK(kind IN ('message_intake','reminder_dispatch','escalation')),
    task_id             TEXT,
    payload             TEXT,
    fire_at             TEXT NOT NULL,
    attempt             INTEGER NOT NULL DEFAULT 0,
    step                INTEGER NOT NULL DEFAULT 0,
    expected_count      INTEGER,
    status              TEXT NOT NULL CHECK(status IN ('queued','running','done','failed')),
    last_error          TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_log (
    id                  TEXT PRIMARY KEY NOT NULL,
    owner_id            TEXT NOT NULL,
    direction           TEXT NOT NULL CHECK(direction IN ('incoming','outgoing')),
    content             TEXT NOT NULL,
    intent              TEXT,
    task_id             TEXT,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_owner_status ON task(owner_id, status);
CREATE INDEX IF NOT EXISTS idx_task_owner_due ON task(owner_id, due_at);
CREATE INDEX IF NOT EXISTS idx_reminder_task ON reminder(task_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_reminder_slot
    ON reminder(task_id, sequence) WHERE status != 'failed';
CREATE INDEX IF NOT EXISTS idx_batch_owner_active ON pending_batch(owner_id, active);
CREATE INDEX IF NOT EXISTS idx_job_due ON scheduled_job(status, fire_at);
CREATE INDEX IF NOT EXISTS idx_conversation_owner ON conversation_log(owner_id, created_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
