//! Generic document collection over SQLite.
//!
//! Every collection is a table of `(id, body)` rows where `body` is the JSON
//! document without its id.  [`Collection`] provides the CRUD contract every
//! component builds on: upsert-by-key, get (single or batch), replace,
//! field patches, filtered listing, delete and clear.
//!
//! Filters are typed values translated to `json_extract` predicates; field
//! names never come from user input but are still checked before they are
//! spliced into SQL.

use std::marker::PhantomData;

use clipthread_shared::RecordId;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Field name that addresses the primary key instead of the JSON body.
pub const ID_FIELD: &str = "id";

/// A document type stored in its own collection.
pub trait Record: Serialize + DeserializeOwned + Send + 'static {
    /// Table name of the collection.
    const COLLECTION: &'static str;

    fn id(&self) -> RecordId;
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Clause {
    Eq(String, Value),
    In(String, Vec<Value>),
    AnyOf(Vec<Filter>),
}

/// Conjunction of field conditions.  An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: RecordId) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    /// `field == value`; a `null` value also matches documents lacking the field.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.to_string(), value.into()));
        self
    }

    /// `field` equals one of `values`.  An empty set matches nothing.
    pub fn is_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// At least one of `alternatives` holds.
    pub fn any_of(mut self, alternatives: impl IntoIterator<Item = Filter>) -> Self {
        self.clauses.push(Clause::AnyOf(alternatives.into_iter().collect()));
        self
    }

    /// Equality on every top-level field of a document.
    fn from_document(body: &Map<String, Value>) -> Self {
        body.iter()
            .fold(Self::new(), |filter, (field, value)| filter.eq(field, value.clone()))
    }

    fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut params = Vec::new();
        let sql = self.write_sql(&mut params)?;
        Ok((sql, params))
    }

    fn write_sql(&self, params: &mut Vec<SqlValue>) -> Result<String> {
        if self.clauses.is_empty() {
            return Ok("1".to_string());
        }

        let mut parts = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let part = match clause {
                Clause::Eq(field, value) => {
                    let column = column(field)?;
                    match value {
                        Value::Null => format!("{column} IS NULL"),
                        Value::Array(_) | Value::Object(_) => {
                            params.push(SqlValue::Text(value.to_string()));
                            format!("{column} = json(?)")
                        }
                        scalar => {
                            params.push(scalar_to_sql(scalar));
                            format!("{column} = ?")
                        }
                    }
                }
                Clause::In(field, values) => {
                    let column = column(field)?;
                    params.push(SqlValue::Text(Value::Array(values.clone()).to_string()));
                    format!("{column} IN (SELECT value FROM json_each(?))")
                }
                Clause::AnyOf(alternatives) => {
                    if alternatives.is_empty() {
                        "0".to_string()
                    } else {
                        let mut branches = Vec::with_capacity(alternatives.len());
                        for alternative in alternatives {
                            branches.push(format!("({})", alternative.write_sql(params)?));
                        }
                        format!("({})", branches.join(" OR "))
                    }
                }
            };
            parts.push(part);
        }
        Ok(parts.join(" AND "))
    }
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering on one field; ties fall back to the id in the same direction.
#[derive(Debug, Clone)]
pub struct Sort {
    field: String,
    direction: Direction,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }

    fn to_sql(&self) -> Result<String> {
        let direction = match self.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        Ok(format!(
            "ORDER BY {} {direction}, id {direction}",
            column(&self.field)?
        ))
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Typed handle on one collection.
pub struct Collection<T> {
    db: Database,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        T::COLLECTION
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Upsert: replace the document matching `key` (or, without a key, the
    /// document equal to `record` on every field), inserting it when nothing
    /// matches.
    ///
    /// Returns the new id when an insert happened, `None` when an existing
    /// document was replaced or a unique index rejected the write.
    pub async fn add(&self, key: Option<Filter>, record: &T) -> Result<Option<RecordId>> {
        let (id, body) = split_document(record)?;
        let filter = key.unwrap_or_else(|| Filter::from_document(&body));
        let (where_sql, where_params) = filter.to_sql()?;
        let body = Value::Object(body).to_string();
        let table = T::COLLECTION;

        self.db
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let existing: Option<String> = tx
                    .query_row(
                        &format!("SELECT id FROM {table} WHERE {where_sql} LIMIT 1"),
                        params_from_iter(where_params.iter()),
                        |row| row.get(0),
                    )
                    .optional()?;

                let outcome = match &existing {
                    Some(existing_id) => tx.execute(
                        &format!("UPDATE {table} SET body = ?1 WHERE id = ?2"),
                        params![body, existing_id],
                    ),
                    None => tx.execute(
                        &format!("INSERT INTO {table} (id, body) VALUES (?1, ?2)"),
                        params![id.to_string(), body],
                    ),
                };

                let inserted = match outcome {
                    Ok(_) if existing.is_none() => Some(id),
                    Ok(_) => None,
                    Err(e) if is_unique_violation(&e) => {
                        tracing::debug!(collection = table, "upsert rejected by unique index");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                };

                tx.commit()?;
                Ok(inserted)
            })
            .await
    }

    /// Plain insert.  A unique-index conflict yields `None` instead of an error.
    pub async fn insert(&self, record: &T) -> Result<Option<RecordId>> {
        let (id, body) = split_document(record)?;
        let body = Value::Object(body).to_string();
        let table = T::COLLECTION;

        self.db
            .call(move |conn| {
                match conn.execute(
                    &format!("INSERT INTO {table} (id, body) VALUES (?1, ?2)"),
                    params![id.to_string(), body],
                ) {
                    Ok(_) => Ok(Some(id)),
                    Err(e) if is_unique_violation(&e) => {
                        tracing::debug!(collection = table, "insert rejected by unique index");
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub async fn get(&self, id: RecordId) -> Result<Option<T>> {
        self.get_as(id).await
    }

    /// Fetch one document, decoded into a projection type `P`.
    pub async fn get_as<P>(&self, id: RecordId) -> Result<Option<P>>
    where
        P: DeserializeOwned + Send + 'static,
    {
        self.find_as(Filter::by_id(id)).await
    }

    /// Fetch every existing document among `ids`; duplicates collapse and
    /// the result is ordered by id.
    pub async fn get_many(&self, ids: &[RecordId]) -> Result<Vec<T>> {
        self.get_many_as(ids).await
    }

    pub async fn get_many_as<P>(&self, ids: &[RecordId]) -> Result<Vec<P>>
    where
        P: DeserializeOwned + Send + 'static,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.list_as(
            Filter::new().is_in(ID_FIELD, ids.iter().copied()),
            Some(Sort::asc(ID_FIELD)),
            None,
        )
        .await
    }

    pub async fn list(
        &self,
        filter: Filter,
        sort: Option<Sort>,
        limit: Option<u32>,
    ) -> Result<Vec<T>> {
        self.list_as(filter, sort, limit).await
    }

    pub async fn list_as<P>(
        &self,
        filter: Filter,
        sort: Option<Sort>,
        limit: Option<u32>,
    ) -> Result<Vec<P>>
    where
        P: DeserializeOwned + Send + 'static,
    {
        let (where_sql, params) = filter.to_sql()?;
        let order_sql = match sort {
            Some(sort) => sort.to_sql()?,
            None => String::new(),
        };
        let limit_sql = limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT id, body FROM {} WHERE {where_sql} {order_sql} {limit_sql}",
            T::COLLECTION
        );

        self.db
            .call(move |conn| query_documents(conn, &sql, &params))
            .await
    }

    /// First document matching `filter`.
    pub async fn find(&self, filter: Filter) -> Result<Option<T>> {
        self.find_as(filter).await
    }

    pub async fn find_as<P>(&self, filter: Filter) -> Result<Option<P>>
    where
        P: DeserializeOwned + Send + 'static,
    {
        Ok(self.list_as(filter, None, Some(1)).await?.into_iter().next())
    }

    pub async fn count(&self, filter: Filter) -> Result<u64> {
        let (where_sql, params) = filter.to_sql()?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {where_sql}", T::COLLECTION);

        self.db
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
    }

    pub async fn count_all(&self) -> Result<u64> {
        self.count(Filter::new()).await
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the stored document with `record`.  Returns `false` when no
    /// document has that id.
    pub async fn update(&self, record: &T) -> Result<bool> {
        let (id, body) = split_document(record)?;
        let body = Value::Object(body).to_string();
        let table = T::COLLECTION;

        self.db
            .call(move |conn| {
                let affected = conn.execute(
                    &format!("UPDATE {table} SET body = ?1 WHERE id = ?2"),
                    params![body, id.to_string()],
                )?;
                Ok(affected > 0)
            })
            .await
    }

    /// Overwrite individual fields on every document matching `filter`.
    /// Returns the number of documents changed.
    pub async fn set_fields(&self, filter: Filter, fields: Vec<(&str, Value)>) -> Result<usize> {
        if fields.is_empty() {
            return Ok(0);
        }

        let mut params = Vec::with_capacity(fields.len());
        let mut assignments = Vec::with_capacity(fields.len());
        for (field, value) in &fields {
            if *field == ID_FIELD || !is_plain_field(field) {
                return Err(StoreError::InvalidField(field.to_string()));
            }
            assignments.push(format!("'$.{field}', json(?)"));
            params.push(SqlValue::Text(value.to_string()));
        }

        let (where_sql, where_params) = filter.to_sql()?;
        params.extend(where_params);
        let sql = format!(
            "UPDATE {} SET body = json_set(body, {}) WHERE {where_sql}",
            T::COLLECTION,
            assignments.join(", ")
        );

        self.db
            .call(move |conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
            .await
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete one document.  Returns `true` if a row was deleted.
    pub async fn delete(&self, id: RecordId) -> Result<bool> {
        Ok(self.delete_where(Filter::by_id(id)).await? > 0)
    }

    /// Delete every document among `ids`.  Returns the number deleted.
    pub async fn delete_many(&self, ids: &[RecordId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_where(Filter::new().is_in(ID_FIELD, ids.iter().copied()))
            .await
    }

    pub async fn delete_where(&self, filter: Filter) -> Result<usize> {
        let (where_sql, params) = filter.to_sql()?;
        let sql = format!("DELETE FROM {} WHERE {where_sql}", T::COLLECTION);

        self.db
            .call(move |conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
            .await
    }

    /// Remove every document in the collection.
    pub async fn clear(&self) -> Result<()> {
        let table = T::COLLECTION;
        tracing::info!(collection = table, "clearing collection");

        self.db
            .call(move |conn| {
                conn.execute(&format!("DELETE FROM {table}"), [])?;
                Ok(())
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_plain_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQL expression addressing `field`.
fn column(field: &str) -> Result<String> {
    if field == ID_FIELD {
        return Ok(ID_FIELD.to_string());
    }
    if !is_plain_field(field) {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(format!("json_extract(body, '$.{field}')"))
}

// json_extract yields SQL scalars; booleans come back as 0/1.
fn scalar_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Serialize `record` and detach its id from the body.
fn split_document<T: Record>(record: &T) -> Result<(RecordId, Map<String, Value>)> {
    match serde_json::to_value(record)? {
        Value::Object(mut body) => {
            body.remove(ID_FIELD);
            Ok((record.id(), body))
        }
        _ => Err(StoreError::NotADocument(T::COLLECTION)),
    }
}

fn decode<P: DeserializeOwned>(id: String, body: &str) -> Result<P> {
    let mut document: Map<String, Value> = serde_json::from_str(body)?;
    document.insert(ID_FIELD.to_string(), Value::String(id));
    Ok(serde_json::from_value(Value::Object(document))?)
}

fn query_documents<P: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<P>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, body) = row?;
        documents.push(decode(id, &body)?);
    }
    Ok(documents)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
