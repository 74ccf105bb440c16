pub const SCHEMA: &str = r#"
-- Accounts; usernames are matched case-insensitively
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    email TEXT,
    is_staff INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

-- One profile per user, created lazily
CREATE TABLE IF NOT EXISTS user_profiles (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    name TEXT,
    city TEXT,
    country TEXT,
    organization TEXT,
    home_page TEXT,
    twitter TEXT,
    description TEXT,
    require_auth INTEGER NOT NULL DEFAULT 0
);

-- Tokens are auth credentials; non-admin tokens must belong to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- 8 chars used for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,            -- NULL = never
    last_used_at TEXT
);

-- Published forms
CREATE TABLE IF NOT EXISTS forms (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    id_string TEXT NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,

    -- Sharing flags
    shared INTEGER NOT NULL DEFAULT 0,
    shared_data INTEGER NOT NULL DEFAULT 0,
    downloadable INTEGER NOT NULL DEFAULT 1,

    -- SMS settings
    allows_sms INTEGER NOT NULL DEFAULT 0,
    sms_id_string TEXT NOT NULL,

    json TEXT NOT NULL,
    definition_path TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(user_id, id_string),
    UNIQUE(user_id, sms_id_string)
);

-- Auxiliary records attached to a form
CREATE TABLE IF NOT EXISTS form_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    data_value TEXT,
    data_file TEXT,
    data_file_type TEXT,
    file_hash TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Capability grants a user holds on a form
CREATE TABLE IF NOT EXISTS form_grants (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    capabilities INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, form_id)
);

-- Collected data; deletion only sets deleted_at
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    uuid TEXT NOT NULL UNIQUE,
    data TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    deleted_at TEXT
);

-- Append-only activity log
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    actor TEXT NOT NULL,
    account TEXT NOT NULL,
    message TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '{}',
    client_ip TEXT,
    created_at TEXT NOT NULL
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_forms_user ON forms(user_id);
CREATE INDEX IF NOT EXISTS idx_forms_shared ON forms(shared);
CREATE INDEX IF NOT EXISTS idx_metadata_form ON form_metadata(form_id, kind);
CREATE INDEX IF NOT EXISTS idx_grants_form ON form_grants(form_id);
CREATE INDEX IF NOT EXISTS idx_submissions_form ON submissions(form_id);
CREATE INDEX IF NOT EXISTS idx_audit_account ON audit_log(account, created_at);
"#;
