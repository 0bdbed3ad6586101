//! Delivery of row snapshots to the secondary Supabase REST store.
//!
//! Snapshots are written to `mirror_outbox` inside the transaction that
//! changed the row, then upserted by a background worker and deleted. Delivery
//! is keyed on the row id, so redelivering a snapshot is harmless. Snapshots of
//! one row go out in the order they were queued: once one fails, the newer
//! ones for the same row wait for the next pass.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    config::MirrorConfig,
    entity::mirror_outbox::{ActiveModel as OutboxActive, Column as OutboxCol, Entity as MirrorOutbox},
    error::{AppError, AppResult},
    state::AppState,
};

const BATCH_SIZE: u64 = 50;

/// Queue a snapshot of `row` for the remote `resource` table.
pub async fn enqueue<C, T>(conn: &C, resource: &str, row: &T) -> AppResult<()>
where
    C: ConnectionTrait,
    T: Serialize,
{
    let payload = serde_json::to_value(row)
        .map_err(|err| AppError::Internal(anyhow::anyhow!("mirror payload: {err}")))?;

    OutboxActive {
        id: Set(Uuid::new_v4()),
        resource: Set(resource.to_string()),
        payload: Set(payload),
        attempts: Set(0),
        last_error: Set(None),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Queue every row of `rows` for `resource`.
pub async fn enqueue_all<C, T>(conn: &C, resource: &str, rows: &[T]) -> AppResult<()>
where
    C: ConnectionTrait,
    T: Serialize,
{
    for row in rows {
        enqueue(conn, resource, row).await?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Rejected { status: reqwest::StatusCode, body: String },
}

/// Destination of outbox snapshots.
pub trait MirrorSink {
    fn upsert(&self, resource: &str, payload: &Value) -> impl Future<Output = Result<(), MirrorError>> + Send;
}

/// PostgREST client for the secondary store.
pub struct MirrorClient {
    client: Client,
    config: MirrorConfig,
}

impl MirrorClient {
    pub fn new(config: MirrorConfig) -> Result<Self, MirrorError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}?on_conflict=id", self.config.url, resource)
    }
}

impl MirrorSink for MirrorClient {
    async fn upsert(&self, resource: &str, payload: &Value) -> Result<(), MirrorError> {
        let response = self
            .client
            .post(self.endpoint(resource))
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(MirrorError::Rejected {
            status,
            body: body.chars().take(200).collect(),
        })
    }
}

/// Remote row a snapshot belongs to.
fn snapshot_key(resource: &str, payload: &Value) -> (String, String) {
    let id = payload.get("id").map(Value::to_string).unwrap_or_default();
    (resource.to_string(), id)
}

/// Push one batch of queued snapshots, oldest first. Returns how many were
/// delivered. Rows that used up `max_attempts` stay in the table, unsent.
pub async fn deliver_pending<C, S>(conn: &C, sink: &S, max_attempts: i32) -> AppResult<usize>
where
    C: ConnectionTrait,
    S: MirrorSink,
{
    let pending = MirrorOutbox::find()
        .filter(OutboxCol::Attempts.lt(max_attempts))
        .order_by_asc(OutboxCol::CreatedAt)
        .order_by_asc(OutboxCol::Id)
        .limit(BATCH_SIZE)
        .all(conn)
        .await?;

    let mut blocked: HashSet<(String, String)> = HashSet::new();
    let mut delivered = 0;
    for row in pending {
        let key = snapshot_key(&row.resource, &row.payload);
        if blocked.contains(&key) {
            tracing::debug!(id = %row.id, resource = %row.resource, "mirror snapshot waits for an older one");
            continue;
        }
        match sink.upsert(&row.resource, &row.payload).await {
            Ok(()) => {
                MirrorOutbox::delete_by_id(row.id).exec(conn).await?;
                delivered += 1;
            }
            Err(err) => {
                blocked.insert(key);
                let attempts = row.attempts + 1;
                if attempts >= max_attempts {
                    tracing::error!(id = %row.id, resource = %row.resource, error = %err, "mirror delivery abandoned");
                } else {
                    tracing::warn!(id = %row.id, resource = %row.resource, attempts, error = %err, "mirror delivery failed");
                }
                MirrorOutbox::update_many()
                    .col_expr(OutboxCol::Attempts, Expr::value(attempts))
                    .col_expr(OutboxCol::LastError, Expr::value(Some(err.to_string())))
                    .filter(OutboxCol::Id.eq(row.id))
                    .exec(conn)
                    .await?;
            }
        }
    }
    Ok(delivered)
}

/// Start the delivery loop when the mirror is configured.
pub fn spawn_worker(state: AppState, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
    let config = state.config.mirror.clone()?;
    let interval_secs = config.interval_secs.max(1);
    let max_attempts = config.max_attempts;

    let client = match MirrorClient::new(config) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "mirror client unavailable, worker not started");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        tracing::info!(interval_secs, max_attempts, "mirror worker started");
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match deliver_pending(&state.orm, &client, max_attempts).await {
                        Ok(0) => {}
                        Ok(count) => tracing::debug!(count, "mirror snapshots delivered"),
                        Err(err) => tracing::warn!(error = %err, "mirror delivery pass failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("mirror worker stopped");
    }))
}
