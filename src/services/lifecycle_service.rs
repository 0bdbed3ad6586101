//! Status transitions after creation, and the sweep that applies the
//! time-based ones.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit::record_booking_event,
    domain::{BookingStatus, PENDING_REFUND, projection},
    dto::bookings::{BookingAction, BookingRef, BookingWithItems, UpdateBookingRequest},
    entity::{
        booking_items::{Column as ItemCol, Entity as BookingItems},
        bookings::{ActiveModel as BookingActive, Column as BookingCol, Entity as Bookings, Model as BookingModel},
        inventories::Model as InventoryModel,
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_operator},
    mirror,
    services::{
        booking_service::{BookingGraph, email_eq, ensure_owner, find_booking, load_items, with_items},
        inventory_service, payment_service,
    },
    state::AppState,
};

const EXPIRED_REASON: &str = "Expired payment deadline";
const PARTIAL_REFUND_REASON: &str = "Partial refund";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub expired: usize,
    pub completed: usize,
}

/// Dispatch a PUT action to its transition.
pub async fn apply_action(
    state: &AppState,
    user: Option<&AuthUser>,
    payload: UpdateBookingRequest,
) -> AppResult<BookingWithItems> {
    payload.target.validate()?;
    let target = &payload.target;
    match payload.action {
        BookingAction::Pay => {
            payment_service::pay_booking(state, user, target, payload.payment).await
        }
        BookingAction::Cancel => {
            cancel_booking(state, session(user)?, target, payload.reason.as_deref()).await
        }
        BookingAction::Refund => {
            request_refund(state, session(user)?, target, payload.reason.as_deref()).await
        }
        BookingAction::RefundItem => {
            let item_id = payload
                .item_id
                .ok_or_else(|| AppError::MissingField("itemId".into()))?;
            refund_item(state, session(user)?, target, item_id).await
        }
        BookingAction::Expire => expire_booking(state, session(user)?, target).await,
        BookingAction::Complete => complete_booking(state, session(user)?, target).await,
        BookingAction::ApproveRefund => approve_refund(state, session(user)?, target).await,
    }
}

fn session(user: Option<&AuthUser>) -> AppResult<&AuthUser> {
    user.ok_or(AppError::LoginRequired)
}

fn status_of(booking: &BookingModel) -> AppResult<BookingStatus> {
    booking.status.parse()
}

fn is_refund_pending(booking: &BookingModel) -> bool {
    booking.status == BookingStatus::Pending.as_str()
        && booking.pending_type.as_deref() == Some(PENDING_REFUND)
}

fn awaiting_payment(booking: &BookingModel) -> bool {
    booking.status == BookingStatus::Pending.as_str() && booking.pending_type.is_none()
}

/// Move a booking into a released state, keeping the given reason.
fn close(booking: BookingModel, status: BookingStatus, reason: Option<String>, now: DateTime<Utc>) -> BookingActive {
    let mut active: BookingActive = booking.into();
    active.status = Set(status.as_str().into());
    active.pending_type = Set(None);
    active.cancelled_at = Set(Some(now.into()));
    if let Some(reason) = reason {
        active.cancellation_reason = Set(Some(reason));
    }
    active.updated_at = Set(now.into());
    active
}

async fn release_live<C: ConnectionTrait>(conn: &C, booking_id: Uuid) -> AppResult<Vec<InventoryModel>> {
    let items = load_items(conn, booking_id).await?;
    inventory_service::release_items(conn, &items).await
}

/// Commit a transition and report it.
async fn finish(
    state: &AppState,
    txn: DatabaseTransaction,
    actor: Option<Uuid>,
    action: &str,
    booking: BookingModel,
    ledgers: Vec<InventoryModel>,
    extra: Value,
) -> AppResult<BookingWithItems> {
    let items = load_items(&txn, booking.id).await?;
    if state.mirror_enabled() {
        mirror::enqueue(&txn, "bookings", &booking).await?;
        mirror::enqueue_all(&txn, "booking_items", &items).await?;
        mirror::enqueue_all(&txn, "inventories", &ledgers).await?;
        if !ledgers.is_empty() {
            let products = Products::find()
                .filter(ProdCol::Id.is_in(ledgers.iter().map(|l| l.product_id)))
                .all(&txn)
                .await?;
            mirror::enqueue_all(&txn, "products", &products).await?;
        }
    }
    txn.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        status = %booking.status,
        action,
        released = ledgers.len(),
        "booking transition applied"
    );
    record_booking_event(&state.pool, actor, action, booking.id, extra).await;
    Ok(with_items(booking, items))
}

/// Return the booking as it is; used for repeated requests.
async fn unchanged(txn: DatabaseTransaction, booking: BookingModel) -> AppResult<BookingWithItems> {
    let items = load_items(&txn, booking.id).await?;
    txn.commit().await?;
    tracing::debug!(booking_id = %booking.id, status = %booking.status, "transition already applied");
    Ok(with_items(booking, items))
}

async fn expire_locked(
    txn: &DatabaseTransaction,
    booking: BookingModel,
    now: DateTime<Utc>,
) -> AppResult<(BookingModel, Vec<InventoryModel>)> {
    let ledgers = release_live(txn, booking.id).await?;
    let booking = close(booking, BookingStatus::Expired, Some(EXPIRED_REASON.into()), now)
        .update(txn)
        .await?;
    Ok((booking, ledgers))
}

async fn complete_locked(
    txn: &DatabaseTransaction,
    booking: BookingModel,
    now: DateTime<Utc>,
) -> AppResult<BookingModel> {
    let mut active: BookingActive = booking.into();
    active.status = Set(BookingStatus::Completed.as_str().into());
    active.updated_at = Set(now.into());
    Ok(active.update(txn).await?)
}

pub async fn expire_booking(
    state: &AppState,
    user: &AuthUser,
    target: &BookingRef,
) -> AppResult<BookingWithItems> {
    let txn = state.orm.begin().await?;
    let booking = find_booking(&txn, target, true).await?;
    ensure_owner(state, user, &booking).await?;

    if status_of(&booking)? == BookingStatus::Expired {
        return unchanged(txn, booking).await;
    }
    if !awaiting_payment(&booking) {
        return Err(AppError::InvalidStatus(format!(
            "only unpaid PENDING bookings expire, booking is {}",
            booking.status
        )));
    }

    let (booking, ledgers) = expire_locked(&txn, booking, Utc::now()).await?;
    finish(state, txn, user.user_id, "booking_expired", booking, ledgers, json!({})).await
}

pub async fn complete_booking(
    state: &AppState,
    user: &AuthUser,
    target: &BookingRef,
) -> AppResult<BookingWithItems> {
    let txn = state.orm.begin().await?;
    let booking = find_booking(&txn, target, true).await?;
    ensure_owner(state, user, &booking).await?;

    match status_of(&booking)? {
        BookingStatus::Completed => return unchanged(txn, booking).await,
        BookingStatus::Paid => {}
        other => {
            return Err(AppError::InvalidStatus(format!("cannot complete a {other} booking")));
        }
    }

    let booking = complete_locked(&txn, booking, Utc::now()).await?;
    finish(state, txn, user.user_id, "booking_completed", booking, Vec::new(), json!({})).await
}

pub async fn cancel_booking(
    state: &AppState,
    user: &AuthUser,
    target: &BookingRef,
    reason: Option<&str>,
) -> AppResult<BookingWithItems> {
    let txn = state.orm.begin().await?;
    let booking = find_booking(&txn, target, true).await?;
    ensure_owner(state, user, &booking).await?;

    match status_of(&booking)? {
        BookingStatus::Cancelled => return unchanged(txn, booking).await,
        BookingStatus::Pending | BookingStatus::Paid => {}
        other => {
            return Err(AppError::InvalidStatus(format!("cannot cancel a {other} booking")));
        }
    }

    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("Cancelled by customer")
        .to_string();
    let ledgers = release_live(&txn, booking.id).await?;
    let booking = close(booking, BookingStatus::Cancelled, Some(reason.clone()), Utc::now())
        .update(&txn)
        .await?;
    finish(
        state,
        txn,
        user.user_id,
        "booking_cancelled",
        booking,
        ledgers,
        json!({ "reason": reason }),
    )
    .await
}

pub async fn request_refund(
    state: &AppState,
    user: &AuthUser,
    target: &BookingRef,
    reason: Option<&str>,
) -> AppResult<BookingWithItems> {
    let txn = state.orm.begin().await?;
    let booking = find_booking(&txn, target, true).await?;
    ensure_owner(state, user, &booking).await?;

    if is_refund_pending(&booking) {
        return unchanged(txn, booking).await;
    }
    let status = status_of(&booking)?;
    if !status.is_settled() {
        return Err(AppError::InvalidStatus(format!("cannot refund a {status} booking")));
    }

    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("no reason given");
    let now = Utc::now();
    let mut active: BookingActive = booking.into();
    active.status = Set(BookingStatus::Pending.as_str().into());
    active.pending_type = Set(Some(PENDING_REFUND.into()));
    active.cancellation_reason = Set(Some(format!("Refund requested - {reason}")));
    active.invoice_expiry_date = Set(None);
    active.updated_at = Set(now.into());
    let booking = active.update(&txn).await?;

    finish(
        state,
        txn,
        user.user_id,
        "refund_requested",
        booking,
        Vec::new(),
        json!({ "reason": reason, "previous_status": status.as_str() }),
    )
    .await
}

pub async fn refund_item(
    state: &AppState,
    user: &AuthUser,
    target: &BookingRef,
    item_id: Uuid,
) -> AppResult<BookingWithItems> {
    let txn = state.orm.begin().await?;
    let booking = find_booking(&txn, target, true).await?;
    ensure_owner(state, user, &booking).await?;

    let items = load_items(&txn, booking.id).await?;
    let item = items
        .iter()
        .find(|i| i.id == item_id)
        .cloned()
        .ok_or(AppError::ItemNotFound)?;
    if item.is_cancelled {
        return unchanged(txn, booking).await;
    }
    if !(status_of(&booking)?.is_settled() || is_refund_pending(&booking)) {
        return Err(AppError::InvalidStatus(format!(
            "cannot refund items of a {} booking",
            booking.status
        )));
    }

    let now = Utc::now();
    let ledgers: Vec<InventoryModel> = match item.inventory_id {
        Some(inventory_id) => inventory_service::release(&txn, inventory_id, item.quantity)
            .await?
            .into_iter()
            .collect(),
        None => Vec::new(),
    };
    BookingItems::update_many()
        .col_expr(ItemCol::IsCancelled, Expr::value(true))
        .col_expr(ItemCol::CancelledAt, Expr::value(now))
        .filter(ItemCol::Id.eq(item.id))
        .exec(&txn)
        .await?;

    let remaining = items.iter().filter(|i| !i.is_cancelled && i.id != item.id).count();
    let booking = if remaining == 0 {
        let mut active = close(booking, BookingStatus::Refunded, Some(PARTIAL_REFUND_REASON.into()), now);
        active.invoice_expiry_date = Set(None);
        active.update(&txn).await?
    } else {
        let mut active: BookingActive = booking.into();
        active.status = Set(BookingStatus::Pending.as_str().into());
        active.pending_type = Set(Some(PENDING_REFUND.into()));
        active.cancellation_reason = Set(Some(PARTIAL_REFUND_REASON.into()));
        active.invoice_expiry_date = Set(None);
        active.updated_at = Set(now.into());
        active.update(&txn).await?
    };

    finish(
        state,
        txn,
        user.user_id,
        "item_refunded",
        booking,
        ledgers,
        json!({ "item_id": item.id, "remaining_items": remaining }),
    )
    .await
}

pub async fn approve_refund(
    state: &AppState,
    user: &AuthUser,
    target: &BookingRef,
) -> AppResult<BookingWithItems> {
    ensure_operator(user)?;
    let txn = state.orm.begin().await?;
    let booking = find_booking(&txn, target, true).await?;

    if status_of(&booking)? == BookingStatus::Refunded {
        return unchanged(txn, booking).await;
    }
    if !is_refund_pending(&booking) {
        return Err(AppError::InvalidStatus(format!(
            "no refund is pending, booking is {}",
            booking.status
        )));
    }

    let ledgers = release_live(&txn, booking.id).await?;
    let booking = close(booking, BookingStatus::Refunded, None, Utc::now())
        .update(&txn)
        .await?;
    finish(state, txn, user.user_id, "refund_approved", booking, ledgers, json!({})).await
}

/// Sweep the bookings of one customer. Failures are logged, never returned.
pub async fn sweep_owner(state: &AppState, customer_ids: &[Uuid], email: Option<&str>) -> SweepOutcome {
    let mut owner = Condition::any().add(BookingCol::CustomerId.is_in(customer_ids.to_vec()));
    if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
        owner = owner.add(email_eq(BookingCol::CustomerEmail, email));
    }
    sweep(state, Some(owner)).await
}

pub async fn sweep_all(state: &AppState) -> SweepOutcome {
    sweep(state, None).await
}

async fn sweep(state: &AppState, owner: Option<Condition>) -> SweepOutcome {
    let now = Utc::now();
    let mut outcome = SweepOutcome::default();

    match expire_due(state, owner.clone(), now).await {
        Ok(count) => outcome.expired = count,
        Err(err) => tracing::warn!(error = %err, "expiry sweep failed"),
    }
    match complete_due(state, owner, now).await {
        Ok(count) => outcome.completed = count,
        Err(err) => tracing::warn!(error = %err, "completion sweep failed"),
    }
    outcome
}

async fn expire_due(state: &AppState, owner: Option<Condition>, now: DateTime<Utc>) -> AppResult<usize> {
    let window = state.config.policy.payment_window;
    let due = Condition::any()
        .add(BookingCol::InvoiceExpiryDate.lte(now))
        .add(
            Condition::all()
                .add(BookingCol::InvoiceExpiryDate.is_null())
                .add(BookingCol::CreatedAt.lte(now - window)),
        );
    let mut filter = Condition::all()
        .add(BookingCol::Status.eq(BookingStatus::Pending.as_str()))
        .add(BookingCol::PendingType.is_null())
        .add(due);
    if let Some(owner) = owner {
        filter = filter.add(owner);
    }

    let candidates: Vec<Uuid> = Bookings::find()
        .select_only()
        .column(BookingCol::Id)
        .filter(filter)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let mut expired = 0;
    for id in candidates {
        match expire_one(state, id, window, now).await {
            Ok(true) => expired += 1,
            Ok(false) => {}
            Err(err) => tracing::warn!(booking_id = %id, error = %err, "sweep could not expire booking"),
        }
    }
    Ok(expired)
}

async fn expire_one(state: &AppState, id: Uuid, window: Duration, now: DateTime<Utc>) -> AppResult<bool> {
    let txn = state.orm.begin().await?;
    let Some(booking) = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        return Ok(false);
    };
    // paid or expired by someone else since the candidate query
    if !awaiting_payment(&booking) || projection::payment_deadline(&booking, window) > now {
        return Ok(false);
    }

    let (booking, ledgers) = expire_locked(&txn, booking, now).await?;
    finish(state, txn, None, "booking_expired", booking, ledgers, json!({ "sweep": true })).await?;
    Ok(true)
}

async fn complete_due(state: &AppState, owner: Option<Condition>, now: DateTime<Utc>) -> AppResult<usize> {
    // the last arrival is never before the first leg's date
    let mut filter = Condition::all()
        .add(BookingCol::Status.eq(BookingStatus::Paid.as_str()))
        .add(BookingCol::BookingDate.lte((now + Duration::days(1)).date_naive()));
    if let Some(owner) = owner {
        filter = filter.add(owner);
    }
    let paid = Bookings::find().filter(filter).all(&state.orm).await?;
    if paid.is_empty() {
        return Ok(0);
    }

    let policy = &state.config.policy;
    let graph = BookingGraph::load(&state.orm, &paid).await?;
    let mut completed = 0;
    for booking in paid {
        let arrived = graph
            .latest_arrival(booking.id, policy)
            .is_some_and(|arrival| arrival <= now);
        if !arrived {
            continue;
        }
        match complete_one(state, booking.id, now).await {
            Ok(true) => completed += 1,
            Ok(false) => {}
            Err(err) => tracing::warn!(booking_id = %booking.id, error = %err, "sweep could not complete booking"),
        }
    }
    Ok(completed)
}

async fn complete_one(state: &AppState, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
    let txn = state.orm.begin().await?;
    let Some(booking) = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        return Ok(false);
    };
    if booking.status != BookingStatus::Paid.as_str() {
        return Ok(false);
    }

    let booking = complete_locked(&txn, booking, now).await?;
    finish(state, txn, None, "booking_completed", booking, Vec::new(), json!({ "sweep": true })).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn booking(status: &str, pending_type: Option<&str>) -> BookingModel {
        let ts = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap().into();
        BookingModel {
            id: Uuid::new_v4(),
            booking_code: "FBAAAAAA260501000000".into(),
            customer_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            status: status.into(),
            pending_type: pending_type.map(str::to_string),
            currency: "IDR".into(),
            total_amount: 200_000,
            port_fee: 0,
            booking_date: NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
            customer_name: "Ayu".into(),
            customer_email: "ayu@example.com".into(),
            customer_phone: String::new(),
            customer_notes: None,
            payment_method: None,
            paid_amount: None,
            paid_at: None,
            xendit_invoice_id: None,
            xendit_payment_channel: None,
            invoice_expiry_date: None,
            cancelled_at: None,
            cancellation_reason: Some("Refund requested - weather".into()),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn refund_pending_is_not_awaiting_payment() {
        let pending = booking("PENDING", None);
        let refund = booking("PENDING", Some(PENDING_REFUND));
        assert!(awaiting_payment(&pending));
        assert!(!is_refund_pending(&pending));
        assert!(!awaiting_payment(&refund));
        assert!(is_refund_pending(&refund));
    }

    #[test]
    fn closing_clears_refund_marker_and_keeps_reason_when_none_given() {
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 0, 0, 0).unwrap();
        let active = close(booking("PENDING", Some(PENDING_REFUND)), BookingStatus::Refunded, None, now);
        assert_eq!(active.status, Set("REFUNDED".to_string()));
        assert_eq!(active.pending_type, Set(None));
        assert!(active.cancellation_reason.is_unchanged());
    }
}
