use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(action)
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a booking transition; failures are logged and never surface.
pub async fn record_booking_event(
    pool: &DbPool,
    actor: Option<Uuid>,
    action: &str,
    booking_id: Uuid,
    extra: Value,
) {
    let metadata = match extra {
        Value::Object(mut map) => {
            map.insert("booking_id".into(), Value::String(booking_id.to_string()));
            Value::Object(map)
        }
        other => serde_json::json!({ "booking_id": booking_id, "detail": other }),
    };

    if let Err(err) = log_audit(pool, actor, action, Some("bookings"), Some(metadata)).await {
        tracing::warn!(error = %err, action, %booking_id, "audit log failed");
    }
}
