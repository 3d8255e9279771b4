//! # tw-store: Job Store
//!
//! The persistence seam of TrustWipe. Components receive an
//! `Arc<dyn JobStore>` and never touch a global handle.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: `parking_lot` tables for tests and database-less runs.
//! - [`PgStore`]: PostgreSQL via `sqlx`, with embedded migrations.
//!
//! Both implement the same claim and compare-and-set semantics; the test
//! suite runs against [`MemoryStore`].
//!
//! ## Audit
//!
//! [`audit`] holds the append-only [`AuditSink`] collaborator and its
//! tracing, in-memory, and hash-chained PostgreSQL implementations.

pub mod audit;
pub mod error;
pub mod memory;
pub mod pg;
pub mod repository;

pub use audit::{
    AuditEvent, AuditEventKind, AuditSink, ChainIntegrity, FanoutAuditSink, MemoryAuditSink,
    PgAuditSink, TracingAuditSink, record_or_log,
};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use pg::{init_pool, PgStore};
pub use repository::{CertificateFilter, JobFilter, JobStore, Page};
