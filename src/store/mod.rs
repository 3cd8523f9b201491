//! Day-partitioned NDJSON persistence
//!
//! Two write paths share the same files:
//!
//! ```text
//!   live path ──write()──▶ PartitionedLogStore ──append──▶ {day}.jsonl
//!   jobs ──upsert_merge()──▶ read + merge + sort ──tmp+rename──▶ {day}.jsonl
//! ```
//!
//! Readers skip malformed lines, so a torn append never poisons a partition.

pub mod error;
pub mod layout;
pub mod partition;
pub mod upsert;

pub use error::StoreError;
pub use layout::{list_days, StoreLayout};
pub use partition::{partition_path, PartitionedLogStore};
pub use upsert::{read_partition, upsert_merge, UpsertStats};
