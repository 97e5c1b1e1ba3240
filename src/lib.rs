// Meet Ledger - Core Library
// Ingests sports meet result archives into a normalized SQLite registry.
// Exposes all modules for use in the CLI and tests.

pub mod error;
pub mod config;
pub mod logging;
pub mod dates;
pub mod regions;        // Region Directory
pub mod archive;        // Archive Extractor
pub mod parser;         // Record Parser
pub mod db;
pub mod entities;       // Meet / Team / Participant / links
pub mod audit;          // Audit Log
pub mod resolver;       // Entity Resolver
pub mod deduplication;  // Meet Upsert & Canonicalizer
pub mod queue;          // Parse Queue
pub mod retry;
pub mod ingest;         // Per-item pipeline
pub mod scheduler;      // Sequential queue consumer
pub mod import;
pub mod export;

// Re-export commonly used types
pub use error::{IngestError, Result};
pub use config::{IngestConfig, RetryConfig};
pub use db::{open_database, registry_counts, setup_database, RegistryCounts};
pub use regions::RegionDirectory;
pub use archive::{extract_result_document, ExtractedDocument};
pub use parser::{parse_lines, ParsedDocument, Record, RecordTag, TeamType};
pub use entities::{
    DiscoveredMeet, Meet, MeetLedger,
    Participant, ParticipantRegistry,
    Team, TeamRegistry,
};
pub use audit::{AuditEntry, AuditKind};
pub use resolver::{EntityResolver, ResolveStats};
pub use deduplication::{canonicalize, DuplicatePair};
pub use queue::{QueueCounts, QueueItem, QueueStatus};
pub use retry::{retry_on_lock, RetryPolicy};
pub use ingest::{ArchiveIngestor, IngestReport, ItemProcessor};
pub use scheduler::{RunSummary, Scheduler};
pub use import::{import_archive, record_discovered, record_download, ImportedArchive};
pub use export::export_meets_csv;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
