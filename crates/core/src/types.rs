/// Jobs are addressed by the string identifier the server hands back
/// (or a locally generated one for simulated runs).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
