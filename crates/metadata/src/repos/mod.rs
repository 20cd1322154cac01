//! Repository traits for metadata operations.

pub mod file_records;

pub use file_records::FileRecordRepo;
