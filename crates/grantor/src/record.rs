//! Input records: header shapes, CSV reading, and targets.
//!
//! A record set is read in full before processing starts so the header can be
//! checked up front and the total is known for progress reporting. Rows are
//! kept as raw fields; turning a row into an [`AccessRecord`] is part of
//! per-record processing, so a malformed row fails on its own.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{BatchError, RecordError, SchemaError};

/// Supported header layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputShape {
    /// `mannequin_username, mannequin_id, role, target`.
    ///
    /// `mannequin_id` carries the username or email to grant.
    Mannequin,
    /// `mannequin_user, mannequin_id, target_user, role, target`.
    ///
    /// `target_user` carries the username or email to grant.
    Reclaim,
    /// `mannequin_username, mannequin_id, role`; the target comes from the
    /// configured organization or repository override.
    Untargeted,
}

impl InputShape {
    pub const ALL: [InputShape; 3] = [
        InputShape::Mannequin,
        InputShape::Reclaim,
        InputShape::Untargeted,
    ];

    #[must_use]
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            InputShape::Mannequin => &["mannequin_username", "mannequin_id", "role", "target"],
            InputShape::Reclaim => &[
                "mannequin_user",
                "mannequin_id",
                "target_user",
                "role",
                "target",
            ],
            InputShape::Untargeted => &["mannequin_username", "mannequin_id", "role"],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            InputShape::Mannequin => "mannequin",
            InputShape::Reclaim => "reclaim",
            InputShape::Untargeted => "untargeted",
        }
    }

    #[must_use]
    pub fn has_target_column(self) -> bool {
        !matches!(self, InputShape::Untargeted)
    }

    /// Match a header row, ignoring surrounding whitespace and ASCII case.
    #[must_use]
    pub fn detect<S: AsRef<str>>(header: &[S]) -> Option<Self> {
        Self::ALL.into_iter().find(|shape| {
            let columns = shape.columns();
            columns.len() == header.len()
                && columns
                    .iter()
                    .zip(header)
                    .all(|(want, got)| want.eq_ignore_ascii_case(got.as_ref().trim()))
        })
    }

    fn expected_list() -> String {
        Self::ALL
            .iter()
            .map(|shape| format!("[{}]", shape.columns().join(", ")))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a grant goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Organization(String),
    Repository { owner: String, name: String },
}

impl Target {
    /// Parse a target string. Anything containing `/` is a repository and
    /// must be exactly `owner/name`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("target must be provided".to_string());
        }

        match raw.split_once('/') {
            None => Ok(Target::Organization(raw.to_string())),
            Some((owner, name)) => {
                let (owner, name) = (owner.trim(), name.trim());
                if owner.is_empty() || name.is_empty() || name.contains('/') {
                    return Err(format!(
                        "repository target '{raw}' must have the form owner/name"
                    ));
                }
                Ok(Target::Repository {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Organization(org) => f.write_str(org),
            Target::Repository { owner, name } => write!(f, "{owner}/{name}"),
        }
    }
}

/// A fixed target applied when the input omits one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOverride {
    Org(String),
    Repo(String),
}

impl TargetOverride {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TargetOverride::Org(s) | TargetOverride::Repo(s) => s,
        }
    }
}

/// One row of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    /// 1-based line in the input (header is line 1).
    pub line: u64,
    /// Display name of the mannequin; informational.
    pub mannequin: String,
    /// Username or email to grant access to.
    pub source_identity: String,
    /// Mannequin ID from the migration; informational.
    pub source_user_id: String,
    /// Role label in the source vocabulary.
    pub role: String,
    /// Organization login or `owner/repo`.
    pub target: String,
}

/// A data row as read from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRow {
    /// The row as it appeared in the file, for logs.
    #[must_use]
    pub fn display(&self) -> String {
        self.fields.join(",")
    }

    /// Map fields to an [`AccessRecord`] according to `shape`.
    ///
    /// An empty target cell falls back to the override. Only the column
    /// count is checked here; content is validated by the processor.
    pub fn to_record(
        &self,
        shape: InputShape,
        target_override: Option<&TargetOverride>,
    ) -> Result<AccessRecord, RecordError> {
        let expected = shape.columns().len();
        if self.fields.len() != expected {
            return Err(RecordError::validation(format!(
                "expected {expected} fields, found {}",
                self.fields.len()
            )));
        }

        let field = |i: usize| self.fields[i].trim().to_string();
        let (mannequin, source_user_id, source_identity, role, target) = match shape {
            InputShape::Mannequin => (field(0), field(1), field(1), field(2), field(3)),
            InputShape::Reclaim => (field(0), field(1), field(2), field(3), field(4)),
            InputShape::Untargeted => (field(0), field(1), field(1), field(2), String::new()),
        };

        let target = match (target.is_empty(), target_override) {
            (true, Some(fixed)) => fixed.as_str().to_string(),
            _ => target,
        };

        Ok(AccessRecord {
            line: self.line,
            mannequin,
            source_identity,
            source_user_id,
            role,
            target,
        })
    }
}

/// A validated header plus the data rows beneath it.
#[derive(Debug, Clone)]
pub struct RecordSet {
    shape: InputShape,
    rows: Vec<RawRow>,
}

impl RecordSet {
    /// Open and read a CSV file.
    pub fn from_path(
        path: &Path,
        target_override: Option<&TargetOverride>,
    ) -> Result<Self, BatchError> {
        let file = File::open(path).map_err(|source| BatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, target_override)
    }

    /// Read CSV from any reader, validating the header first.
    pub fn from_reader<R: Read>(
        reader: R,
        target_override: Option<&TargetOverride>,
    ) -> Result<Self, BatchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header: Vec<String> = reader
            .byte_headers()?
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let text = String::from_utf8_lossy(raw);
                if i == 0 {
                    text.trim_start_matches('\u{feff}').trim().to_string()
                } else {
                    text.trim().to_string()
                }
            })
            .collect();

        if header.iter().all(|h| h.is_empty()) {
            return Err(SchemaError::MissingHeader.into());
        }

        let shape = InputShape::detect(&header).ok_or_else(|| SchemaError::UnrecognizedHeader {
            found: header.clone(),
            expected: InputShape::expected_list(),
        })?;

        if !shape.has_target_column() && target_override.is_none() {
            return Err(SchemaError::MissingTarget { columns: header }.into());
        }

        let mut rows = Vec::new();
        let mut record = csv::ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            let line = record.position().map_or(0, |p| p.line());
            rows.push(RawRow {
                line,
                fields: record
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect(),
            });
        }

        Ok(Self { shape, rows })
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
