//! Database schema definition

/// SQL schema for the Codify database
pub const SCHEMA: &str = r#"
-- Registered source documents (content lives elsewhere; we keep the name
-- for provenance and the project link for merge resolution)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    project_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id);

-- One codified extraction per source document; a newer extraction for the
-- same document supersedes older ones
CREATE TABLE IF NOT EXISTS extractions (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    project_id TEXT,
    items TEXT NOT NULL,
    matched INTEGER NOT NULL DEFAULT 0,
    suggested INTEGER NOT NULL DEFAULT 0,
    pending_review INTEGER NOT NULL DEFAULT 0,
    confirmed INTEGER NOT NULL DEFAULT 0,
    unmatched INTEGER NOT NULL DEFAULT 0,
    fast_pass_completed INTEGER NOT NULL DEFAULT 0,
    smart_pass_completed INTEGER NOT NULL DEFAULT 0,
    is_fully_confirmed INTEGER NOT NULL DEFAULT 0,
    merged_to_project_library INTEGER NOT NULL DEFAULT 0,
    merged_at TEXT,
    codified_at TEXT NOT NULL,
    smart_pass_at TEXT,
    confirmed_at TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    deleted_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_extractions_document ON extractions(document_id);
CREATE INDEX IF NOT EXISTS idx_extractions_project ON extractions(project_id);
CREATE INDEX IF NOT EXISTS idx_extractions_unmerged
    ON extractions(is_fully_confirmed, merged_to_project_library);

-- Per-project data library, one row per (project, item code)
CREATE TABLE IF NOT EXISTS project_items (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    item_code TEXT NOT NULL,
    category TEXT,
    current_value TEXT NOT NULL,
    current_value_normalized REAL NOT NULL,
    current_data_type TEXT,
    current_source_document_id TEXT NOT NULL,
    current_source_document_name TEXT NOT NULL,
    last_updated_at TEXT NOT NULL,
    last_updated_by TEXT,
    has_multiple_sources INTEGER NOT NULL DEFAULT 0,
    value_variance REAL,
    value_history TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_project_items_key
    ON project_items(project_id, item_code);
CREATE INDEX IF NOT EXISTS idx_project_items_project ON project_items(project_id);

-- Merge outbox: every scheduled merge is a visible row rather than an
-- invisible fire-and-forget call
CREATE TABLE IF NOT EXISTS merge_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    extraction_id TEXT NOT NULL,
    project_id TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_merge_tasks_status ON merge_tasks(status);
CREATE INDEX IF NOT EXISTS idx_merge_tasks_extraction ON merge_tasks(extraction_id);
"#;
