//! Per product, per date capacity ledger.
//!
//! Every write changes `booked_units` and re-derives `available_units` from
//! `total_capacity` in the same statement. Reservations are a single
//! conditional UPDATE, so two concurrent payments can never both take the
//! last seats. The product's `total_bookings` follows the seats held across
//! all of its ledger rows.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    entity::{
        booking_items,
        inventories::{ActiveModel as InventoryActive, Column as InvCol, Entity as Inventories, Model as InventoryModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
};

pub async fn find_ledger<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    date: NaiveDate,
) -> AppResult<Option<InventoryModel>> {
    let ledger = Inventories::find()
        .filter(InvCol::ProductId.eq(product_id))
        .filter(InvCol::InventoryDate.eq(date))
        .one(conn)
        .await?;
    Ok(ledger)
}

async fn count_seats<C: ConnectionTrait>(conn: &C, product_id: Uuid, quantity: i32) -> AppResult<()> {
    Products::update_many()
        .col_expr(ProdCol::TotalBookings, Expr::col(ProdCol::TotalBookings).add(quantity))
        .filter(ProdCol::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn uncount_seats<C: ConnectionTrait>(conn: &C, product_id: Uuid, quantity: i32) -> AppResult<()> {
    let result = Products::update_many()
        .col_expr(ProdCol::TotalBookings, Expr::col(ProdCol::TotalBookings).sub(quantity))
        .filter(ProdCol::Id.eq(product_id))
        .filter(ProdCol::TotalBookings.gte(quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        Products::update_many()
            .col_expr(ProdCol::TotalBookings, Expr::value(0))
            .filter(ProdCol::Id.eq(product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

/// Create the ledger row for `product_id` on `date` unless it already exists.
pub async fn ensure_ledger<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    date: NaiveDate,
    total_capacity: i32,
) -> AppResult<()> {
    let capacity = total_capacity.max(0);
    let row = InventoryActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        inventory_date: Set(date),
        total_capacity: Set(capacity),
        booked_units: Set(0),
        available_units: Set(capacity),
        is_available: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    };

    let inserted = Inventories::insert(row)
        .on_conflict(
            OnConflict::columns([InvCol::ProductId, InvCol::InventoryDate])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    if inserted > 0 {
        tracing::info!(%product_id, %date, capacity, "inventory ledger created");
    }
    Ok(())
}

/// Take `quantity` units from the ledger, creating it with
/// `capacity_if_missing` (or `quantity` when unknown) on first use.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    date: NaiveDate,
    quantity: i32,
    capacity_if_missing: Option<i32>,
) -> AppResult<InventoryModel> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be greater than 0".into()));
    }

    ensure_ledger(conn, product_id, date, capacity_if_missing.unwrap_or(quantity)).await?;

    let result = Inventories::update_many()
        .col_expr(InvCol::BookedUnits, Expr::col(InvCol::BookedUnits).add(quantity))
        .col_expr(
            InvCol::AvailableUnits,
            Expr::col(InvCol::TotalCapacity).sub(Expr::col(InvCol::BookedUnits).add(quantity)),
        )
        .col_expr(InvCol::UpdatedAt, Expr::current_timestamp().into())
        .filter(InvCol::ProductId.eq(product_id))
        .filter(InvCol::InventoryDate.eq(date))
        .filter(InvCol::IsAvailable.eq(true))
        .filter(Expr::col(InvCol::BookedUnits).lte(Expr::col(InvCol::TotalCapacity).sub(quantity)))
        .exec(conn)
        .await?;

    let ledger = find_ledger(conn, product_id, date)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("inventory ledger vanished")))?;

    if result.rows_affected == 0 {
        tracing::warn!(
            %product_id,
            %date,
            quantity,
            available = ledger.available_units,
            "reservation refused"
        );
        return Err(AppError::InsufficientCapacity(format!(
            "{} seat(s) requested on {date}, {} available",
            quantity,
            if ledger.is_available { ledger.available_units } else { 0 }
        )));
    }
    count_seats(conn, product_id, quantity).await?;

    tracing::debug!(
        inventory_id = %ledger.id,
        booked = ledger.booked_units,
        available = ledger.available_units,
        "inventory reserved"
    );
    Ok(ledger)
}

/// Give `quantity` units back to a ledger row.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    inventory_id: Uuid,
    quantity: i32,
) -> AppResult<Option<InventoryModel>> {
    if quantity <= 0 {
        return Ok(None);
    }

    let result = Inventories::update_many()
        .col_expr(InvCol::BookedUnits, Expr::col(InvCol::BookedUnits).sub(quantity))
        .col_expr(
            InvCol::AvailableUnits,
            Expr::col(InvCol::TotalCapacity).sub(Expr::col(InvCol::BookedUnits).sub(quantity)),
        )
        .col_expr(InvCol::UpdatedAt, Expr::current_timestamp().into())
        .filter(InvCol::Id.eq(inventory_id))
        .filter(InvCol::BookedUnits.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // The ledger holds fewer units than we are returning; clamp at empty.
        let clamped = Inventories::update_many()
            .col_expr(InvCol::BookedUnits, Expr::value(0))
            .col_expr(InvCol::AvailableUnits, Expr::col(InvCol::TotalCapacity).into())
            .col_expr(InvCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(InvCol::Id.eq(inventory_id))
            .exec(conn)
            .await?;
        if clamped.rows_affected == 0 {
            tracing::warn!(%inventory_id, "release skipped, ledger row missing");
            return Ok(None);
        }
        tracing::warn!(%inventory_id, quantity, "release clamped at zero booked units");
    }

    let ledger = Inventories::find_by_id(inventory_id).one(conn).await?;
    if let Some(ledger) = &ledger {
        uncount_seats(conn, ledger.product_id, quantity).await?;
    }
    Ok(ledger)
}

/// Release the reservations held by `items`, one statement per ledger row.
/// Cancelled items and items without a ledger link hold nothing.
pub async fn release_items<C: ConnectionTrait>(
    conn: &C,
    items: &[booking_items::Model],
) -> AppResult<Vec<InventoryModel>> {
    let mut per_ledger: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items.iter().filter(|i| !i.is_cancelled) {
        if let Some(inventory_id) = item.inventory_id {
            *per_ledger.entry(inventory_id).or_default() += item.quantity;
        }
    }

    let mut touched = Vec::with_capacity(per_ledger.len());
    for (inventory_id, quantity) in per_ledger {
        if let Some(ledger) = release(conn, inventory_id, quantity).await? {
            touched.push(ledger);
        }
    }
    Ok(touched)
}

/// Advisory check made while a booking is assembled: fails only when an
/// existing ledger row cannot hold the party. Nothing is reserved.
pub async fn check_availability<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    date: NaiveDate,
    quantity: i32,
) -> AppResult<Option<InventoryModel>> {
    let ledger = find_ledger(conn, product_id, date).await?;
    if let Some(ledger) = &ledger {
        if !ledger.is_available || ledger.available_units < quantity {
            return Err(AppError::InsufficientCapacity(format!(
                "{} seat(s) requested on {date}, {} available",
                quantity,
                if ledger.is_available { ledger.available_units } else { 0 }
            )));
        }
    }
    Ok(ledger)
}
