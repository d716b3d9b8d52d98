use sqlx::Row;

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub org_id: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub ledger: Option<u64>,
    pub tx_hash: String,
    pub observed_at: i64,
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct OrgRow {
    pub id: u64,
    pub name: String,
    pub admin: String,
    pub open_membership: bool,
    pub members_can_propose: bool,
    pub metadata_ref: Option<String>,
    pub member_count: u64,
}

pub(super) fn event_from_row(row: sqlx::sqlite::SqliteRow) -> Result<EventRow, sqlx::Error> {
    let payload_text: String = row.try_get("payload")?;
    let payload = serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null);
    Ok(EventRow {
        id: row.try_get("id")?,
        org_id: row.try_get::<i64, _>("org_id")? as u64,
        kind: row.try_get("kind")?,
        payload,
        ledger: row.try_get::<Option<i64>, _>("ledger")?.map(|v| v as u64),
        tx_hash: row.try_get("tx_hash")?,
        observed_at: row.try_get("observed_at")?,
        verified: row.try_get("verified")?,
    })
}

pub(super) fn org_from_row(row: sqlx::sqlite::SqliteRow) -> Result<OrgRow, sqlx::Error> {
    Ok(OrgRow {
        id: row.try_get::<i64, _>("id")? as u64,
        name: row.try_get("name")?,
        admin: row.try_get("admin")?,
        open_membership: row.try_get("open_membership")?,
        members_can_propose: row.try_get("members_can_propose")?,
        metadata_ref: row.try_get("metadata_ref")?,
        member_count: row.try_get::<i64, _>("member_count")? as u64,
    })
}
