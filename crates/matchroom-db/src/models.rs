/// Database row types. These map directly to SQLite rows and stay
/// independent of the wire types in matchroom-types.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: i64,
    pub a_id: i64,
    pub b_id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub text: String,
    pub ts: i64,
}

/// A message about to be appended. `a_id < b_id` is enforced by the schema.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub a_id: i64,
    pub b_id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub text: &'a str,
    pub ts: i64,
}
