//! Append-only activity sink. Failures here are logged and swallowed;
//! they never break the operation that emitted the event.

use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::events::DomainEvent;
use crate::state::AppState;

/// Persist the event and, when NATS is configured, publish it. Called
/// after the originating transaction commits.
pub async fn record(state: &AppState, ctx: Option<&AuthContext>, event: &DomainEvent) {
    let (user_id, tenant_id, role, client_addr) = match ctx {
        Some(c) => (
            c.user_id(),
            c.tenant_id,
            c.role.as_str().to_string(),
            c.client_addr.clone(),
        ),
        None => (None, None, String::new(), None),
    };

    let action = event.action();
    let details = event.details();

    let insert = sqlx::query(
        "INSERT INTO activity_events (id, user_id, tenant_id, role, action, details, client_addr) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(tenant_id)
    .bind(&role)
    .bind(action)
    .bind(&details)
    .bind(&client_addr)
    .execute(&state.db)
    .await;

    if let Err(err) = insert {
        tracing::warn!(action, %err, "activity event not persisted");
    }

    if let Some(nats) = &state.nats {
        let subject = format!("commerce.events.{action}");
        let payload = serde_json::json!({
            "action": action,
            "user_id": user_id,
            "tenant_id": tenant_id,
            "role": role,
            "details": details,
        });
        if let Err(err) = nats
            .publish(subject, serde_json::to_vec(&payload).unwrap_or_default().into())
            .await
        {
            tracing::warn!(action, %err, "activity event not published");
        }
    }
}
