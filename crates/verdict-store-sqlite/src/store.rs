//! [`SqliteStore`] — the SQLite implementation of [`DocumentStore`] and
//! [`AuditLog`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use uuid::Uuid;

use verdict_core::{
  audit::{AuditRecord, NewAuditRecord},
  document::{Collection, DocQuery, Document, Fields, Increment, Order},
  store::{AuditLog, DocumentStore},
};

use crate::{
  encode::{
    AUDIT_COLUMNS, DOCUMENT_COLUMNS, RawAuditRecord, RawDocument, encode_dt, encode_fields,
    encode_steps, encode_uuid, filter_value, json_path,
  },
  schema::SCHEMA,
  Error, Result,
};

/// Single-statement counter upsert. A missing row is created holding just
/// the counter; an existing row has the counter added to in place, so
/// concurrent increments never lose an update.
const UPSERT_INCREMENT: &str = "
  INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
  VALUES (?1, ?2, json_object(?3, ?4), ?5, ?5)
  ON CONFLICT (collection, doc_id) DO UPDATE SET
    body       = json_set(body, ?6, COALESCE(json_extract(body, ?6), 0) + ?4),
    updated_at = ?5";

/// An [`Increment`] with its field already turned into a JSON path.
struct EncodedIncrement {
  collection: &'static str,
  id:         String,
  field:      String,
  path:       String,
  delta:      i64,
}

impl EncodedIncrement {
  fn new(inc: &Increment) -> Result<Self> {
    Ok(Self {
      collection: inc.collection.as_str(),
      id:         inc.id.clone(),
      field:      inc.field.clone(),
      path:       json_path(&inc.field)?,
      delta:      inc.delta,
    })
  }

  fn execute(&self, conn: &rusqlite::Connection, now: &str) -> rusqlite::Result<()> {
    conn.execute(
      UPSERT_INCREMENT,
      rusqlite::params![self.collection, self.id, self.field, self.delta, now, self.path],
    )?;
    Ok(())
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Verdict document store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
    let collection_str = collection.as_str();
    let id_str         = id.to_owned();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE collection = ?1 AND doc_id = ?2"
            ),
            rusqlite::params![collection_str, id_str],
            RawDocument::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn put(&self, collection: Collection, id: &str, fields: Fields) -> Result<Document> {
    let collection_str = collection.as_str();
    let id_str         = id.to_owned();
    let body           = encode_fields(&fields)?;
    let now            = encode_dt(Utc::now());

    let raw: RawDocument = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (collection, doc_id) DO UPDATE SET
             body       = excluded.body,
             updated_at = excluded.updated_at",
          rusqlite::params![collection_str, id_str, body, now],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE collection = ?1 AND doc_id = ?2"
          ),
          rusqlite::params![collection_str, id_str],
          RawDocument::from_row,
        )?)
      })
      .await?;

    raw.into_document()
  }

  async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<()> {
    let collection_str = collection.as_str();
    let id_str         = id.to_owned();
    let patch          = encode_fields(&fields)?;
    let now            = encode_dt(Utc::now());

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE documents
           SET body = json_patch(body, ?3), updated_at = ?4
           WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![collection_str, id_str, patch, now],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::DocumentNotFound { collection, id: id.to_owned() });
    }
    Ok(())
  }

  async fn add(&self, collection: Collection, fields: Fields) -> Result<String> {
    let id             = encode_uuid(Uuid::new_v4());
    let collection_str = collection.as_str();
    let id_str         = id.clone();
    let body           = encode_fields(&fields)?;
    let now            = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![collection_str, id_str, body, now],
        )?;
        Ok(())
      })
      .await?;

    Ok(id)
  }

  async fn increment(
    &self,
    collection: Collection,
    id: &str,
    field: &str,
    delta: i64,
  ) -> Result<()> {
    let inc = EncodedIncrement::new(&Increment::new(collection, id, field, delta))?;
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        inc.execute(conn, &now)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn increment_batch(&self, increments: &[Increment]) -> Result<()> {
    // Validate every field before touching the database so a bad name can't
    // leave the batch half-applied.
    let encoded = increments
      .iter()
      .map(EncodedIncrement::new)
      .collect::<Result<Vec<_>>>()?;
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for inc in &encoded {
          inc.execute(&tx, &now)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query(&self, collection: Collection, query: &DocQuery) -> Result<Vec<Document>> {
    let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE collection = ?");
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(collection.as_str().to_owned())];

    for filter in &query.filters {
      let path = json_path(&filter.field)?;
      match filter_value(&filter.field, &filter.value)? {
        Some(value) => {
          sql.push_str(" AND json_extract(body, ?) = ?");
          params.push(SqlValue::Text(path));
          params.push(value);
        }
        None => {
          sql.push_str(" AND json_extract(body, ?) IS NULL");
          params.push(SqlValue::Text(path));
        }
      }
    }

    match &query.order_by {
      Some((field, order)) => {
        let dir = match order {
          Order::Ascending => "ASC",
          Order::Descending => "DESC",
        };
        sql.push_str(&format!(" ORDER BY json_extract(body, ?) {dir}, rowid {dir}"));
        params.push(SqlValue::Text(json_path(field)?));
      }
      None => sql.push_str(" ORDER BY rowid"),
    }

    if let Some(limit) = query.limit {
      sql.push_str(" LIMIT ?");
      params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }
}

// ─── AuditLog impl ───────────────────────────────────────────────────────────

impl AuditLog for SqliteStore {
  async fn append(&self, input: NewAuditRecord) -> Result<AuditRecord> {
    let record = AuditRecord::from_new(input, Uuid::new_v4(), Utc::now());

    let audit_id_str    = encode_uuid(record.audit_id);
    let message_id      = record.message_id.clone();
    let user_id         = record.user_id.clone();
    let reviewer        = record.reviewer.clone();
    let direction       = record.direction.to_string();
    let reason          = record.reason.clone();
    let previous_status = record.previous_status.to_string();
    let new_status      = record.new_status.to_string();
    let targets         = encode_steps(&record.targets)?;
    let failed_steps    = encode_steps(&record.failed_steps)?;
    let outcome         = record.outcome.to_string();
    let recorded_at     = encode_dt(record.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO audit_log ({AUDIT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
          ),
          rusqlite::params![
            audit_id_str,
            message_id,
            user_id,
            reviewer,
            direction,
            reason,
            previous_status,
            new_status,
            targets,
            failed_steps,
            outcome,
            recorded_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn history(&self, message_id: &str, user_id: &str) -> Result<Vec<AuditRecord>> {
    let message_id = message_id.to_owned();
    let user_id    = user_id.to_owned();

    let raws: Vec<RawAuditRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_log
           WHERE message_id = ?1 AND user_id = ?2
           ORDER BY seq DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![message_id, user_id], RawAuditRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditRecord::into_record).collect()
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run raw SQL against the connection; lets tests poke at invariants the
  /// public API never violates.
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }
}
