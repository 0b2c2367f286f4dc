//! The `DocumentStore` and `AuditLog` traits.
//!
//! The traits are implemented by storage backends (e.g.
//! `verdict-store-sqlite`). The coordinator depends on this abstraction, not
//! on any concrete backend. A store only promises single-document atomicity
//! plus atomic counter increments; nothing here spans documents except
//! [`DocumentStore::increment_batch`].

use std::future::Future;

use crate::{
  audit::{AuditRecord, NewAuditRecord},
  document::{Collection, DocQuery, Document, Fields, Increment},
};

/// Abstraction over a key-partitioned document database.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Retrieve a document. Returns `None` if not found.
  fn get<'a>(
    &'a self,
    collection: Collection,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// Create or fully replace a document under a caller-supplied id.
  ///
  /// Used by ingestion and seeding; the coordinator never overwrites a whole
  /// document.
  fn put<'a>(
    &'a self,
    collection: Collection,
    id: &'a str,
    fields: Fields,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'a;

  /// Merge `fields` into an existing document (JSON merge-patch semantics).
  ///
  /// Returns an error if the document does not exist.
  fn update<'a>(
    &'a self,
    collection: Collection,
    id: &'a str,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Insert a new document under a store-generated id and return that id.
  fn add(
    &self,
    collection: Collection,
    fields: Fields,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Atomically add `delta` to a numeric field. A missing document or field
  /// starts from zero.
  fn increment<'a>(
    &'a self,
    collection: Collection,
    id: &'a str,
    field: &'a str,
    delta: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Apply several increments atomically: either all land or none do.
  fn increment_batch<'a>(
    &'a self,
    increments: &'a [Increment],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Return all documents of `collection` matching `query`.
  fn query<'a>(
    &'a self,
    collection: Collection,
    query: &'a DocQuery,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;
}

/// Append-only log of attempted transitions.
///
/// Shares its error type with the document store it lives beside.
pub trait AuditLog: DocumentStore {
  /// Append a record. `audit_id` and `recorded_at` are set by the store.
  fn append(
    &self,
    record: NewAuditRecord,
  ) -> impl Future<Output = Result<AuditRecord, Self::Error>> + Send + '_;

  /// All records for one message, newest first.
  fn history<'a>(
    &'a self,
    message_id: &'a str,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<AuditRecord>, Self::Error>> + Send + 'a;
}
