//! Upload orchestrator for docket.
//!
//! Takes a batch of documents, converts word-processor files to PDF through
//! the conversion service, optimizes PDFs, stores each artifact in object
//! storage and records it in the metadata store. The bucket is provisioned on
//! demand and blobs left without a record are swept by the reconciler.

pub mod collaborators;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod reconcile;
pub mod supervisor;
pub mod task;

pub use collaborators::{ConversionClient, DocumentConverter, PdfOptimizer, ServiceHealth};
pub use error::{IngestError, IngestResult};
pub use pipeline::{Orchestrator, UploadContext};
pub use provision::{BucketProvisioner, BucketState};
pub use reconcile::{ReconcileStats, Reconciler};
pub use supervisor::{BatchTicket, SupervisorError, UploadSupervisor};
pub use task::{BatchReport, FileOutcome, SourceFile, UploadStatus, UploadTask};
