use uuid::Uuid;

/// Time-ordered id for new rows; keeps newest-first scans cheap.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Random, unguessable token for invite links.
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}
