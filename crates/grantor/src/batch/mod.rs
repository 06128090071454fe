//! Batch processing of access records.
//!
//! # Module Structure
//!
//! - [`types`] - Routing, record states, outcomes, [`Summary`], [`BatchOptions`]
//! - [`progress`] - Progress reporting: [`BatchProgress`], [`ProgressCallback`], [`emit()`]
//! - [`processor`] - [`BatchProcessor`], the per-record pipeline
//!
//! # Example
//!
//! ```ignore
//! use grantor::batch::{BatchOptions, BatchProcessor};
//! use grantor::record::RecordSet;
//! use grantor::role::RoleMapper;
//!
//! let records = RecordSet::from_path(path, None)?;
//! let processor = BatchProcessor::new(client, RoleMapper::default(), BatchOptions::default());
//! let summary = processor.process_all(&records, None).await;
//! println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//! ```

mod processor;
mod progress;
mod types;

pub use processor::BatchProcessor;

pub use progress::{BatchProgress, ProgressCallback, emit};

pub use types::{
    BatchOptions, DEFAULT_CONCURRENCY, EndpointKind, RecordOutcome, RecordReport, RecordState,
    ResolvedGrant, SkipReason, Summary, endpoint_kind,
};
