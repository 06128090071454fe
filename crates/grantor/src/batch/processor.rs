//! The batch processor: one record at a time, each isolated from the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Semaphore, mpsc, oneshot};

use crate::error::RecordError;
use crate::github::{Backoff, GitHubClient, GrantStatus, IdentityResolver};
use crate::record::{AccessRecord, RawRow, RecordSet, Target};
use crate::role::{OrgRole, RoleMapper};

use super::progress::{BatchProgress, ProgressCallback, emit};
use super::types::{
    BatchOptions, RecordOutcome, RecordReport, RecordState, ResolvedGrant, SkipReason, Summary,
    endpoint_kind,
};

/// Runs a [`RecordSet`] against GitHub.
///
/// Every record goes through validation, identity resolution, role mapping,
/// and one grant call. Any error stops that record only; the batch always
/// runs to the end unless shutdown is requested.
#[derive(Clone)]
pub struct BatchProcessor {
    inner: Arc<Inner>,
}

struct Inner {
    client: GitHubClient,
    resolver: IdentityResolver,
    roles: RoleMapper,
    options: BatchOptions,
    cancel: Arc<AtomicBool>,
}

impl Inner {
    /// A copy whose client forwards its pauses to `backoffs`.
    fn reporting_to(&self, backoffs: mpsc::UnboundedSender<Backoff>) -> Self {
        let client = self
            .client
            .clone()
            .with_backoff_observer(Arc::new(move |backoff| {
                // The run is over once the receiver is gone.
                let _ = backoffs.send(backoff);
            }));
        Self {
            resolver: IdentityResolver::new(client.clone()),
            client,
            roles: self.roles.clone(),
            options: self.options.clone(),
            cancel: Arc::clone(&self.cancel),
        }
    }
}

/// A row and its mapping to a record.
struct Entry {
    row: RawRow,
    record: Result<AccessRecord, RecordError>,
}

impl Entry {
    fn identity(&self) -> String {
        self.record
            .as_ref()
            .map(|r| r.source_identity.clone())
            .unwrap_or_default()
    }

    fn target(&self) -> String {
        self.record
            .as_ref()
            .map(|r| r.target.clone())
            .unwrap_or_default()
    }
}

/// Line of the first row granted for an (identity, target) pair, or that
/// would have been granted in a dry run.
type GrantedAt = Option<u64>;

/// Links a row to the rows before and after it with the same (identity,
/// target) pair, so each one knows whether the pair was already granted.
#[derive(Default)]
struct Turn {
    earlier: Option<oneshot::Receiver<GrantedAt>>,
    later: Option<oneshot::Sender<GrantedAt>>,
}

impl Turn {
    async fn wait(&mut self) -> GrantedAt {
        match self.earlier.take() {
            Some(rx) => rx.await.ok().flatten(),
            None => None,
        }
    }

    fn pass(self, granted_at: GrantedAt) {
        if let Some(tx) = self.later {
            // No later row shares the pair.
            let _ = tx.send(granted_at);
        }
    }
}

enum Processed {
    Granted {
        grant: ResolvedGrant,
        status: GrantStatus,
    },
    Skipped {
        reason: SkipReason,
        permission: Option<String>,
    },
    Failed {
        error: RecordError,
        stage: RecordState,
    },
    Internal(String),
}

impl Processed {
    /// Whether this row settles its pair for later duplicates.
    fn grants(&self) -> bool {
        matches!(
            self,
            Processed::Granted { .. }
                | Processed::Skipped {
                    reason: SkipReason::DryRun,
                    ..
                }
        )
    }
}

impl BatchProcessor {
    pub fn new(client: GitHubClient, roles: RoleMapper, options: BatchOptions) -> Self {
        let resolver = IdentityResolver::new(client.clone());
        Self {
            inner: Arc::new(Inner {
                client,
                resolver,
                roles,
                options,
                cancel: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Stop starting new records once `flag` is set. Records already in
    /// flight finish; the rest are reported as skipped.
    #[must_use]
    pub fn with_cancel_flag(self, flag: Arc<AtomicBool>) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.cancel = flag;
                inner
            }
            Err(shared) => Inner {
                client: shared.client.clone(),
                resolver: shared.resolver.clone(),
                roles: shared.roles.clone(),
                options: shared.options.clone(),
                cancel: flag,
            },
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.inner.options
    }

    /// Process every row and return the totals.
    ///
    /// Reports and record events follow input order even when records run
    /// concurrently. Rate-limit waits and retries are emitted as
    /// [`BatchProgress::Backoff`] while they happen.
    pub async fn process_all(
        &self,
        records: &RecordSet,
        on_progress: Option<&ProgressCallback>,
    ) -> Summary {
        let (backoff_tx, mut backoff_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(self.inner.reporting_to(backoff_tx));

        let work = run_batch(inner, records, on_progress);
        tokio::pin!(work);

        loop {
            tokio::select! {
                biased;
                Some(backoff) = backoff_rx.recv() => emit(
                    on_progress,
                    BatchProgress::Backoff {
                        request: backoff.request,
                        wait: backoff.wait,
                        cause: backoff.cause,
                    },
                ),
                summary = &mut work => return summary,
            }
        }
    }
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

async fn run_batch(
    inner: Arc<Inner>,
    records: &RecordSet,
    on_progress: Option<&ProgressCallback>,
) -> Summary {
    let options = &inner.options;
    let concurrency = options.concurrency.clamp(1, records.len().max(1));

    emit(
        on_progress,
        BatchProgress::Started {
            total: records.len(),
            shape: records.shape(),
            concurrency,
            dry_run: options.dry_run,
        },
    );

    let entries = plan(records, options);
    let mut summary = Summary::default();

    if concurrency == 1 {
        for (entry, turn) in entries {
            let processed = run_entry(&inner, &entry, turn, None).await;
            finish(&mut summary, on_progress, &entry, processed);
        }
    } else {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(entries.len());

        for (entry, turn) in entries {
            let inner = Arc::clone(&inner);
            let semaphore = Arc::clone(&semaphore);
            let entry = Arc::new(entry);
            let task_entry = Arc::clone(&entry);

            let handle = tokio::spawn(async move {
                run_entry(&inner, &task_entry, turn, Some(semaphore.as_ref())).await
            });
            handles.push((entry, handle));
        }

        for (entry, handle) in handles {
            let processed = match handle.await {
                Ok(processed) => processed,
                Err(e) => Processed::Internal(format!("task panic: {e}")),
            };
            finish(&mut summary, on_progress, &entry, processed);
        }
    }

    emit(
        on_progress,
        BatchProgress::Completed {
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
        },
    );

    summary
}

/// Map rows to records and chain rows sharing an (identity, target) pair.
fn plan(records: &RecordSet, options: &BatchOptions) -> Vec<(Entry, Turn)> {
    let target_override = options.target_override.as_ref();
    let mut pending: HashMap<(String, String), oneshot::Receiver<GrantedAt>> = HashMap::new();

    records
        .rows()
        .iter()
        .map(|row| {
            let record = row.to_record(records.shape(), target_override);
            let turn = match &record {
                Ok(r) if !r.source_identity.is_empty() && !r.target.is_empty() => {
                    let key = (
                        r.source_identity.to_ascii_lowercase(),
                        r.target.to_ascii_lowercase(),
                    );
                    let (tx, rx) = oneshot::channel();
                    Turn {
                        earlier: pending.insert(key, rx),
                        later: Some(tx),
                    }
                }
                _ => Turn::default(),
            };
            let entry = Entry {
                row: row.clone(),
                record,
            };
            (entry, turn)
        })
        .collect()
}

/// Wait for earlier rows with the same pair, then process this one unless
/// the pair is already granted or shutdown was requested.
///
/// The wait happens before taking a concurrency permit, so waiting rows
/// never hold up the rows they wait for.
async fn run_entry(
    inner: &Inner,
    entry: &Entry,
    mut turn: Turn,
    semaphore: Option<&Semaphore>,
) -> Processed {
    let granted_at = turn.wait().await;

    let processed = if inner.cancel.load(Ordering::SeqCst) {
        Processed::Skipped {
            reason: SkipReason::Shutdown,
            permission: None,
        }
    } else if let Some(first_line) = granted_at {
        Processed::Skipped {
            reason: SkipReason::Duplicate { first_line },
            permission: None,
        }
    } else {
        match semaphore {
            Some(semaphore) => match semaphore.acquire().await {
                Ok(_permit) => attempt(inner, entry).await,
                Err(_) => Processed::Internal("semaphore closed unexpectedly".into()),
            },
            None => attempt(inner, entry).await,
        }
    };

    let granted_at = granted_at.or_else(|| processed.grants().then_some(entry.row.line));
    turn.pass(granted_at);
    processed
}

async fn attempt(inner: &Inner, entry: &Entry) -> Processed {
    let record = match &entry.record {
        Ok(record) => record,
        Err(e) => {
            let message = match e {
                RecordError::Validation(message) => message.clone(),
                other => other.to_string(),
            };
            return Processed::Failed {
                error: RecordError::Validation(message),
                stage: RecordState::Pending,
            };
        }
    };

    let mut state = RecordState::Pending;
    match process_record(inner, record, &mut state).await {
        Ok(processed) => processed,
        Err(error) => Processed::Failed {
            error,
            stage: state,
        },
    }
}

async fn process_record(
    inner: &Inner,
    record: &AccessRecord,
    state: &mut RecordState,
) -> Result<Processed, RecordError> {
    let target = validate(record, &inner.roles)?;
    *state = RecordState::Validated;

    let user = inner.resolver.resolve(&record.source_identity).await?;
    let grant = ResolvedGrant {
        target_user_id: user.id,
        login: user.login,
        permission: inner.roles.map_role(&record.role).to_string(),
        endpoint_kind: endpoint_kind(&record.target),
        target,
    };
    *state = RecordState::Resolved;
    tracing::debug!(
        line = record.line,
        identity = %record.source_identity,
        login = %grant.login,
        via = ?user.via,
        "Resolved identity"
    );

    if inner.options.dry_run {
        return Ok(Processed::Skipped {
            reason: SkipReason::DryRun,
            permission: Some(grant.permission),
        });
    }

    *state = RecordState::Submitted;
    let status = match &grant.target {
        Target::Organization(org) => {
            inner
                .client
                .invite_to_org(
                    org,
                    grant.target_user_id,
                    OrgRole::from_permission(&grant.permission),
                )
                .await?
        }
        Target::Repository { owner, name } => {
            inner
                .client
                .add_collaborator(owner, name, &grant.login, &grant.permission)
                .await?
        }
    };
    *state = RecordState::Succeeded;

    Ok(Processed::Granted { grant, status })
}

/// Required fields, role policy, and target format.
fn validate(record: &AccessRecord, roles: &RoleMapper) -> Result<Target, RecordError> {
    if record.source_identity.is_empty() {
        return Err(RecordError::validation("missing username or email"));
    }
    if record.role.is_empty() {
        return Err(RecordError::validation("missing role"));
    }
    roles
        .check(&record.role)
        .map_err(|e| RecordError::validation(e.to_string()))?;
    Target::parse(&record.target).map_err(RecordError::Validation)
}

fn finish(
    summary: &mut Summary,
    on_progress: Option<&ProgressCallback>,
    entry: &Entry,
    processed: Processed,
) {
    let line = entry.row.line;
    let identity = entry.identity();
    let target = entry.target();

    let outcome = match processed {
        Processed::Granted { grant, status } => {
            emit(
                on_progress,
                BatchProgress::RecordSucceeded {
                    line,
                    identity: identity.clone(),
                    login: grant.login,
                    target: target.clone(),
                    endpoint: grant.endpoint_kind,
                    permission: grant.permission,
                    status,
                },
            );
            RecordOutcome::Succeeded { status }
        }
        Processed::Skipped { reason, permission } => {
            emit(
                on_progress,
                BatchProgress::RecordSkipped {
                    line,
                    identity: identity.clone(),
                    target: target.clone(),
                    reason: reason.clone(),
                    permission,
                },
            );
            RecordOutcome::Skipped { reason }
        }
        Processed::Failed { error, stage } => {
            let message = error.to_string();
            emit(
                on_progress,
                BatchProgress::RecordFailed {
                    line,
                    row: entry.row.display(),
                    stage,
                    error: message.clone(),
                    short_error: error.short_message(),
                },
            );
            RecordOutcome::Failed {
                kind: error.kind(),
                message,
                stage,
            }
        }
        Processed::Internal(message) => {
            emit(
                on_progress,
                BatchProgress::RecordFailed {
                    line,
                    row: entry.row.display(),
                    stage: RecordState::Failed,
                    error: message.clone(),
                    short_error: message.clone(),
                },
            );
            RecordOutcome::Failed {
                kind: "internal",
                message,
                stage: RecordState::Failed,
            }
        }
    };

    summary.push(RecordReport {
        line,
        identity,
        target,
        outcome,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ClientOptions;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};
    use crate::record::TargetOverride;
    use crate::role::{DEFAULT_ROLE_TABLE, UnknownRolePolicy};
    use std::sync::Mutex;

    const API: &str = "https://api.github.test";

    fn json(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn user(transport: &MockTransport, login: &str, id: u64) {
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/users/{login}"),
            json(200, &format!(r#"{{"id": {id}, "login": "{login}"}}"#)),
        );
    }

    fn processor(transport: &MockTransport, options: BatchOptions) -> BatchProcessor {
        let client = GitHubClient::new_with_transport(
            API,
            "t",
            ClientOptions::default(),
            Arc::new(transport.clone()),
        )
        .expect("client");
        BatchProcessor::new(client, RoleMapper::default(), options)
    }

    fn records(csv: &str) -> RecordSet {
        RecordSet::from_reader(csv.as_bytes(), None).expect("valid input")
    }

    fn body(transport: &MockTransport, method: HttpMethod, url: &str) -> serde_json::Value {
        let request = transport
            .requests()
            .into_iter()
            .find(|r| r.method == method && r.url == url)
            .expect("request sent");
        serde_json::from_slice(&request.body).expect("json body")
    }

    #[tokio::test]
    async fn test_routes_org_and_repo_targets() {
        let transport = MockTransport::new();
        user(&transport, "mona", 1);
        user(&transport, "hubot", 2);
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(201, "{}"),
        );
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/widgets/collaborators/hubot"),
            json(201, "{}"),
        );

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,Admin,acme\n\
             Hubot,hubot,Write,acme/widgets\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);

        let invite = body(
            &transport,
            HttpMethod::Post,
            &format!("{API}/orgs/acme/invitations"),
        );
        assert_eq!(invite["invitee_id"], 1);
        assert_eq!(invite["role"], "admin");

        let collab = body(
            &transport,
            HttpMethod::Put,
            &format!("{API}/repos/acme/widgets/collaborators/hubot"),
        );
        assert_eq!(collab["permission"], "push");
    }

    #[tokio::test]
    async fn test_record_missing_role_fails_alone() {
        let transport = MockTransport::new();
        user(&transport, "one", 1);
        user(&transport, "three", 3);
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(201, "{}"),
        );
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(201, "{}"),
        );

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             One,one,Read,acme\n\
             Two,two,,acme\n\
             Three,three,Read,acme\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;

        assert_eq!(
            (summary.succeeded, summary.failed, summary.skipped),
            (2, 1, 0)
        );
        let failed = &summary.reports[1];
        assert_eq!(failed.line, 3);
        assert!(matches!(
            failed.outcome,
            RecordOutcome::Failed {
                kind: "validation",
                stage: RecordState::Pending,
                ..
            }
        ));
        // Nothing was looked up for the invalid record.
        assert_eq!(
            transport.request_count(HttpMethod::Get, &format!("{API}/users/two")),
            0
        );
    }

    #[tokio::test]
    async fn test_unknown_role_follows_policy() {
        let transport = MockTransport::new();
        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,Maintainer,acme/widgets\n",
        );

        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;
        assert_eq!(summary.failed, 1);
        assert!(transport.requests().is_empty());

        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/widgets/collaborators/mona"),
            json(201, "{}"),
        );
        let client = GitHubClient::new_with_transport(
            API,
            "t",
            ClientOptions::default(),
            Arc::new(transport.clone()),
        )
        .expect("client");
        let lenient = RoleMapper::new(
            DEFAULT_ROLE_TABLE.iter().copied(),
            "pull",
            UnknownRolePolicy::Default,
        );
        let summary = BatchProcessor::new(client, lenient, BatchOptions::default())
            .process_all(&set, None)
            .await;
        assert_eq!(summary.succeeded, 1);
        let collab = body(
            &transport,
            HttpMethod::Put,
            &format!("{API}/repos/acme/widgets/collaborators/mona"),
        );
        assert_eq!(collab["permission"], "pull");
    }

    #[tokio::test]
    async fn test_not_found_and_api_errors_do_not_stop_the_batch() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/users/ghost"),
            json(404, r#"{"message": "Not Found"}"#),
        );
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(422, r#"{"message": "Validation Failed"}"#),
        );
        user(&transport, "hubot", 2);
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/widgets/collaborators/hubot"),
            json(204, ""),
        );

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Ghost,ghost,Read,acme\n\
             Mona,mona,Read,acme\n\
             Hubot,hubot,Read,acme/widgets\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;

        assert_eq!((summary.succeeded, summary.failed), (1, 2));
        assert!(matches!(
            summary.reports[0].outcome,
            RecordOutcome::Failed {
                kind: "not_found",
                stage: RecordState::Validated,
                ..
            }
        ));
        assert!(matches!(
            summary.reports[1].outcome,
            RecordOutcome::Failed {
                kind: "api",
                stage: RecordState::Submitted,
                ..
            }
        ));
        assert_eq!(
            summary.reports[2].outcome,
            RecordOutcome::Succeeded {
                status: GrantStatus::AlreadyGranted
            }
        );
    }

    #[tokio::test]
    async fn test_dry_run_resolves_but_never_grants() {
        let transport = MockTransport::new();
        user(&transport, "mona", 1);

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,Write,acme/widgets\n",
        );
        let options = BatchOptions {
            dry_run: true,
            ..BatchOptions::default()
        };

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().expect("events lock").push(event);
        });

        let summary = processor(&transport, options)
            .process_all(&set, Some(&callback))
            .await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(transport.requests().len(), 1);
        let events = events.lock().expect("events lock");
        assert!(events.iter().any(|e| matches!(
            e,
            BatchProgress::RecordSkipped {
                reason: SkipReason::DryRun,
                permission: Some(p),
                ..
            } if p == "push"
        )));
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_skipped() {
        let transport = MockTransport::new();
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(201, "{}"),
        );

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,Read,acme\n\
             Mona again,MONA,Write,ACME\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;

        assert_eq!((summary.succeeded, summary.skipped), (1, 1));
        assert_eq!(
            summary.reports[1].outcome,
            RecordOutcome::Skipped {
                reason: SkipReason::Duplicate { first_line: 2 }
            }
        );
    }

    #[tokio::test]
    async fn test_failed_row_does_not_block_a_later_duplicate() {
        let transport = MockTransport::new();
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(201, "{}"),
        );

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,,acme\n\
             Mona,mona,Read,acme\n\
             Mona,mona,Read,acme\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;

        assert_eq!(
            (summary.succeeded, summary.failed, summary.skipped),
            (1, 1, 1)
        );
        assert!(matches!(
            summary.reports[0].outcome,
            RecordOutcome::Failed {
                kind: "validation",
                ..
            }
        ));
        assert_eq!(
            summary.reports[1].outcome,
            RecordOutcome::Succeeded {
                status: GrantStatus::Invited
            }
        );
        assert_eq!(
            summary.reports[2].outcome,
            RecordOutcome::Skipped {
                reason: SkipReason::Duplicate { first_line: 3 }
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_duplicates_wait_for_the_earlier_row() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/users/mona"),
            json(500, r#"{"message": "Server Error"}"#),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/users/mona"),
            json(500, r#"{"message": "Server Error"}"#),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/users/mona"),
            json(500, r#"{"message": "Server Error"}"#),
        );
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/widgets/collaborators/mona"),
            json(201, "{}"),
        );

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,Read,acme/widgets\n\
             Mona,mona,Write,acme/widgets\n\
             Mona,MONA,Read,ACME/widgets\n",
        );
        let options = BatchOptions {
            concurrency: 3,
            ..BatchOptions::default()
        };
        let summary = processor(&transport, options)
            .process_all(&set, None)
            .await;

        assert!(matches!(
            summary.reports[0].outcome,
            RecordOutcome::Failed { kind: "api", .. }
        ));
        assert_eq!(
            summary.reports[1].outcome,
            RecordOutcome::Succeeded {
                status: GrantStatus::Invited
            }
        );
        assert_eq!(
            summary.reports[2].outcome,
            RecordOutcome::Skipped {
                reason: SkipReason::Duplicate { first_line: 3 }
            }
        );
        let collab = body(
            &transport,
            HttpMethod::Put,
            &format!("{API}/repos/acme/widgets/collaborators/mona"),
        );
        assert_eq!(collab["permission"], "push");
    }

    #[tokio::test]
    async fn test_reclaim_rows_accept_github_permission_names() {
        let transport = MockTransport::new();
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/widgets/collaborators/mona"),
            json(201, "{}"),
        );

        let set = records(
            "mannequin_user,mannequin_id,target_user,role,target\n\
             old,M_1,mona,push,acme/widgets\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, None)
            .await;

        assert_eq!(summary.succeeded, 1);
        let collab = body(
            &transport,
            HttpMethod::Put,
            &format!("{API}/repos/acme/widgets/collaborators/mona"),
        );
        assert_eq!(collab["permission"], "push");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_wait_is_reported_while_it_happens() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/users/mona"),
            HttpResponse {
                status: 429,
                headers: vec![("Retry-After".into(), "120".into())],
                body: Vec::new(),
            },
        );
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/invitations"),
            json(201, "{}"),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().expect("events lock").push(event);
        });

        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             Mona,mona,Read,acme\n",
        );
        let summary = processor(&transport, BatchOptions::default())
            .process_all(&set, Some(&callback))
            .await;
        assert_eq!(summary.succeeded, 1);

        let events = events.lock().expect("events lock");
        let backoff = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    BatchProgress::Backoff {
                        cause: crate::github::BackoffCause::RateLimited { .. },
                        ..
                    }
                )
            })
            .expect("backoff reported");
        let succeeded = events
            .iter()
            .position(|e| matches!(e, BatchProgress::RecordSucceeded { .. }))
            .expect("record reported");
        assert!(backoff < succeeded);
        assert!(matches!(
            &events[backoff],
            BatchProgress::Backoff { request, wait, .. }
                if request == "GET /users/mona" && *wait == std::time::Duration::from_secs(121)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_skips_remaining_records() {
        let transport = MockTransport::new();
        let flag = Arc::new(AtomicBool::new(true));
        let set = records(
            "mannequin_username,mannequin_id,role,target\n\
             A,a,Read,acme\n\
             B,b,Read,acme\n",
        );

        let summary = processor(&transport, BatchOptions::default())
            .with_cancel_flag(Arc::clone(&flag))
            .process_all(&set, None)
            .await;

        assert_eq!(summary.skipped, 2);
        assert!(summary.reports.iter().all(|r| r.outcome
            == RecordOutcome::Skipped {
                reason: SkipReason::Shutdown
            }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_run_keeps_input_order() {
        let transport = MockTransport::new();
        let mut csv = String::from("mannequin_username,mannequin_id,role,target\n");
        for i in 0..6 {
            user(&transport, &format!("user{i}"), i);
            transport.push_response(
                HttpMethod::Put,
                format!("{API}/repos/acme/widgets/collaborators/user{i}"),
                json(201, "{}"),
            );
            csv.push_str(&format!("U{i},user{i},Read,acme/widgets\n"));
        }
        // One malformed row in the middle.
        csv.push_str("Bad,bad,Read,acme/\n");

        let options = BatchOptions {
            concurrency: 3,
            ..BatchOptions::default()
        };
        let summary = processor(&transport, options)
            .process_all(&records(&csv), None)
            .await;

        assert_eq!((summary.succeeded, summary.failed), (6, 1));
        let lines: Vec<u64> = summary.reports.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_override_target_for_untargeted_shape() {
        let transport = MockTransport::new();
        user(&transport, "mona", 1);
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/widgets/collaborators/mona"),
            json(201, "{}"),
        );

        let fixed = TargetOverride::Repo("acme/widgets".into());
        let set = RecordSet::from_reader(
            "mannequin_username,mannequin_id,role\nMona,mona,Read\n".as_bytes(),
            Some(&fixed),
        )
        .expect("valid input");
        let options = BatchOptions {
            target_override: Some(fixed),
            ..BatchOptions::default()
        };

        let summary = processor(&transport, options).process_all(&set, None).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.reports[0].target, "acme/widgets");
    }
}
