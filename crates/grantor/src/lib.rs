//! Grantor - bulk GitHub access provisioning.
//!
//! Reads a mannequin export from a GitHub Enterprise Importer migration and,
//! for each row, invites a user to an organization or adds them as a
//! repository collaborator. Every call goes through a client that handles
//! bearer auth, rate-limit waits, and retries with exponential backoff.
//!
//! # Example
//!
//! ```ignore
//! use grantor::batch::{BatchOptions, BatchProcessor};
//! use grantor::github::{ClientOptions, GitHubClient, GITHUB_API_URL};
//! use grantor::record::RecordSet;
//! use grantor::role::RoleMapper;
//!
//! let client = GitHubClient::new(GITHUB_API_URL, &token, ClientOptions::default())?;
//! let records = RecordSet::from_path("mannequins.csv".as_ref(), None)?;
//!
//! let summary = BatchProcessor::new(client, RoleMapper::default(), BatchOptions::default())
//!     .process_all(&records, None)
//!     .await;
//! ```

pub mod batch;
pub mod error;
pub mod github;
pub mod http;
pub mod record;
pub mod retry;
pub mod role;

pub use batch::{BatchOptions, BatchProcessor, BatchProgress, ProgressCallback, Summary};
pub use error::{BatchError, RecordError, SchemaError};
pub use github::{ClientOptions, GitHubClient, GitHubError};
pub use record::{AccessRecord, InputShape, RecordSet, Target, TargetOverride};
pub use retry::RetryConfig;
pub use role::{OrgRole, RoleMapper, UnknownRolePolicy};
