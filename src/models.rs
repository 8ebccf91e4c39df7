//! # Database models
//!
//! Rows of the SQLite schema in [`crate::schema`], mapped with **Diesel**.
//!
//! - [`RouterRow`]: one persisted router; `definition` is the router's YAML
//!   ([`crate::route::RouterDefinition`]).
//! - [`ReferenceRow`]: one embedded reference phrase; `embedding` is a `bincode` blob of `Vec<f32>`.
//! - [`MessageRow`]: one history message scoped by `history_name` and `session_tag`.
//!
//! `id` fields are `Option<i32>` so the same struct serves for inserts (`None`) and
//! loads (`Some`), as SQLite assigns the key.

use diesel::prelude::*;

#[derive(Queryable, Insertable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::routers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RouterRow {
    pub name: String,
    pub definition: String,
    /// Embedding dimension the references were produced with.
    pub dimension: i32,
}

#[derive(Queryable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::route_references)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReferenceRow {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub router_name: String,
    pub route_name: String,
    /// `blake3` hex digest of the reference text.
    pub reference_hash: String,
    pub reference: String,
    pub embedding: Vec<u8>,
}

#[derive(Queryable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MessageRow {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub history_name: String,
    pub session_tag: String,
    /// `"system"`, `"user"`, `"assistant"` or `"tool"`.
    pub role: String,
    pub content: String,
    pub intent: Option<String>,
    pub score: Option<f64>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}
