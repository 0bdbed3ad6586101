use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::record_booking_event,
    domain::BookingStatus,
    dto::bookings::{BookingRef, BookingWithItems, PaymentDetails},
    entity::{
        boats::Entity as Boats,
        booking_items::{Column as ItemCol, Entity as BookingItems, Model as ItemModel},
        bookings::{ActiveModel as BookingActive, Model as BookingModel},
        products::{Column as ProdCol, Entity as Products},
        schedules::Entity as Schedules,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    mirror,
    services::{
        booking_service::{ensure_owner, find_booking, load_items, with_items},
        inventory_service,
    },
    state::AppState,
};

/// Items of one product on one date that still need seats.
#[derive(Debug, Default, PartialEq)]
struct ReservationGroup {
    quantity: i32,
    item_ids: Vec<Uuid>,
    schedule_id: Option<Uuid>,
}

/// Live items without a ledger link, grouped by (product, date). Items that
/// already hold a reservation are skipped, which keeps repeated payments from
/// reserving twice.
fn unreserved_groups(items: &[ItemModel]) -> BTreeMap<(Uuid, NaiveDate), ReservationGroup> {
    let mut groups: BTreeMap<(Uuid, NaiveDate), ReservationGroup> = BTreeMap::new();
    for item in items
        .iter()
        .filter(|i| !i.is_cancelled && i.inventory_id.is_none())
    {
        let group = groups.entry((item.product_id, item.item_date)).or_default();
        group.quantity += item.quantity;
        group.item_ids.push(item.id);
        if group.schedule_id.is_none() {
            group.schedule_id = Some(item.schedule_id);
        }
    }
    groups
}

/// Seats a new ledger row starts with: the schedule's capacity, else its boat's.
async fn capacity_for<C: ConnectionTrait>(conn: &C, schedule_id: Option<Uuid>) -> AppResult<Option<i32>> {
    let Some(schedule_id) = schedule_id else {
        return Ok(None);
    };
    let Some(schedule) = Schedules::find_by_id(schedule_id).one(conn).await? else {
        return Ok(None);
    };
    if schedule.capacity.is_some() {
        return Ok(schedule.capacity);
    }
    let boat_capacity = match schedule.boat_id {
        Some(boat_id) => Boats::find_by_id(boat_id).one(conn).await?.map(|b| b.capacity),
        None => None,
    };
    Ok(boat_capacity)
}

fn apply_payment_details(active: &mut BookingActive, payment: &PaymentDetails) {
    if let Some(method) = payment.payment_method.clone() {
        active.payment_method = Set(Some(method));
    }
    if let Some(invoice) = payment.xendit_invoice_id.clone() {
        active.xendit_invoice_id = Set(Some(invoice));
    }
    if let Some(channel) = payment.xendit_payment_channel.clone() {
        active.xendit_payment_channel = Set(Some(channel));
    }
}

async fn authorize_payment(
    state: &AppState,
    user: Option<&AuthUser>,
    booking: &BookingModel,
    payment: &PaymentDetails,
) -> AppResult<()> {
    if payment.simulate && state.config.simulation_enabled() {
        if payment.paid_amount != Some(booking.total_amount) {
            return Err(AppError::InvalidAmount(format!(
                "paidAmount {} does not match total {}",
                payment
                    .paid_amount
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "missing".into()),
                booking.total_amount
            )));
        }
        tracing::info!(booking_id = %booking.id, "simulated payment accepted");
        return Ok(());
    }
    if payment.simulate {
        tracing::warn!(booking_id = %booking.id, "payment simulation is disabled");
    }
    let user = user.ok_or(AppError::LoginRequired)?;
    ensure_owner(state, user, booking).await
}

pub async fn pay_booking(
    state: &AppState,
    user: Option<&AuthUser>,
    target: &BookingRef,
    payment: PaymentDetails,
) -> AppResult<BookingWithItems> {
    let now = Utc::now();
    let txn = state.orm.begin().await?;

    let booking = find_booking(&txn, target, true).await?;
    authorize_payment(state, user, &booking, &payment).await?;

    let status: BookingStatus = booking.status.parse()?;
    if status.is_settled() {
        // replayed confirmation: refresh metadata only
        let mut active: BookingActive = booking.into();
        apply_payment_details(&mut active, &payment);
        active.updated_at = Set(now.into());
        let booking = active.update(&txn).await?;
        let items = load_items(&txn, booking.id).await?;
        txn.commit().await?;
        tracing::info!(booking_id = %booking.id, "payment already recorded");
        return Ok(with_items(booking, items));
    }
    if status != BookingStatus::Pending {
        return Err(AppError::InvalidStatus(format!("cannot pay a {status} booking")));
    }
    if booking.pending_type.is_some() {
        return Err(AppError::InvalidStatus("a refund is pending for this booking".into()));
    }

    let total_amount = booking.total_amount;
    let mut active: BookingActive = booking.into();
    active.status = Set(BookingStatus::Paid.as_str().into());
    active.pending_type = Set(None);
    active.paid_amount = Set(Some(payment.paid_amount.unwrap_or(total_amount)));
    active.paid_at = Set(Some(now.into()));
    if let Some(expiry) = payment.invoice_expiry_date {
        active.invoice_expiry_date = Set(Some(expiry.into()));
    }
    apply_payment_details(&mut active, &payment);
    active.updated_at = Set(now.into());
    let booking = active.update(&txn).await?;

    let items = load_items(&txn, booking.id).await?;
    let groups = unreserved_groups(&items);

    let mut ledgers = Vec::with_capacity(groups.len());
    let mut product_ids = Vec::with_capacity(groups.len());
    for ((product_id, date), group) in groups {
        let capacity = capacity_for(&txn, group.schedule_id).await?;
        let ledger = inventory_service::reserve(&txn, product_id, date, group.quantity, capacity).await?;

        BookingItems::update_many()
            .col_expr(ItemCol::InventoryId, Expr::value(ledger.id))
            .filter(ItemCol::Id.is_in(group.item_ids))
            .exec(&txn)
            .await?;

        ledgers.push(ledger);
        product_ids.push(product_id);
    }

    let items = load_items(&txn, booking.id).await?;

    if state.mirror_enabled() {
        let products = Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(&txn)
            .await?;
        mirror::enqueue(&txn, "bookings", &booking).await?;
        mirror::enqueue_all(&txn, "inventories", &ledgers).await?;
        mirror::enqueue_all(&txn, "booking_items", &items).await?;
        mirror::enqueue_all(&txn, "products", &products).await?;
    }

    txn.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        booking_code = %booking.booking_code,
        ledgers = ledgers.len(),
        "booking paid"
    );
    record_booking_event(
        &state.pool,
        user.and_then(|u| u.user_id),
        "booking_paid",
        booking.id,
        json!({
            "paid_amount": booking.paid_amount,
            "simulated": payment.simulate,
            "inventories": ledgers.iter().map(|l| l.id).collect::<Vec<_>>(),
        }),
    )
    .await;

    Ok(with_items(booking, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(product: Uuid, day: u32, inventory: Option<Uuid>, cancelled: bool) -> ItemModel {
        let ts = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap().into();
        ItemModel {
            id: Uuid::new_v4(),
            booking_id: Uuid::nil(),
            product_id: product,
            schedule_id: Uuid::nil(),
            inventory_id: inventory,
            leg_role: "SINGLE".into(),
            unit_price: 100_000,
            quantity: 1,
            item_date: NaiveDate::from_ymd_opt(2026, 5, day).unwrap(),
            subtotal: 100_000,
            participant_name: "Passenger".into(),
            special_requirements: None,
            is_cancelled: cancelled,
            cancelled_at: None,
            created_at: ts,
        }
    }

    #[test]
    fn groups_sum_passengers_per_product_and_date() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let items = vec![item(a, 3, None, false), item(a, 3, None, false), item(b, 6, None, false), item(b, 6, None, false)];
        let groups = unreserved_groups(&items);
        assert_eq!(groups.len(), 2);
        let outbound = &groups[&(a, NaiveDate::from_ymd_opt(2026, 5, 3).unwrap())];
        assert_eq!(outbound.quantity, 2);
        assert_eq!(outbound.item_ids.len(), 2);
    }

    #[test]
    fn reserved_and_cancelled_items_need_no_seats() {
        let a = Uuid::new_v4();
        let items = vec![
            item(a, 3, Some(Uuid::new_v4()), false),
            item(a, 3, None, true),
        ];
        assert!(unreserved_groups(&items).is_empty());
    }
}
