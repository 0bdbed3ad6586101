use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, Func, LockType, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit::record_booking_event,
    config::BookingPolicy,
    domain::{
        AgeCategory, Currency, LegRole,
        pricing,
        projection::{self, BookingCard, CardContext, ItemContext},
        timing,
    },
    dto::bookings::{
        BookingCardList, BookingDetail, BookingItemDetail, BookingRef, BookingWithItems,
        ContactInput, CreateBookingRequest, LegInput, PassengerInput, parse_travel_date,
    },
    entity::{
        boats::{Column as BoatCol, Entity as Boats, Model as BoatModel},
        booking_items::{
            ActiveModel as ItemActive, Column as ItemCol, Entity as BookingItems, Model as ItemModel,
        },
        bookings::{ActiveModel as BookingActive, Column as BookingCol, Entity as Bookings, Model as BookingModel},
        inventories::{Column as InvCol, Entity as Inventories, Model as InventoryModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        reviews::{Column as ReviewCol, Entity as Reviews, Model as ReviewModel},
        schedules::{Column as ScheduleCol, Entity as Schedules, Model as ScheduleModel},
        tenants::{Column as TenantCol, Entity as Tenants, Model as TenantModel},
        users::{Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_operator},
    mirror,
    models::{Booking, BookingItem},
    services::{inventory_service, lifecycle_service},
    state::AppState,
};

/// Case-insensitive email comparison on a text column.
pub(crate) fn email_eq(column: impl sea_orm::sea_query::IntoColumnRef, email: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(email.trim().to_lowercase())
}

pub(crate) async fn find_user_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> AppResult<Option<UserModel>> {
    if email.trim().is_empty() {
        return Ok(None);
    }
    let user = Users::find()
        .filter(email_eq(UserCol::Email, email))
        .one(conn)
        .await?;
    Ok(user)
}

/// Customer ids the session may act for: its own id and the account
/// registered under its email, when they differ.
pub(crate) async fn session_customer_ids<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
) -> AppResult<Vec<Uuid>> {
    let mut ids: Vec<Uuid> = user.user_id.into_iter().collect();
    if let Some(email) = user.email.as_deref() {
        if let Some(account) = find_user_by_email(conn, email).await? {
            if !user.is(account.id) {
                ids.push(account.id);
            }
        }
    }
    Ok(ids)
}

pub(crate) async fn owns_booking(
    state: &AppState,
    user: &AuthUser,
    booking: &BookingModel,
) -> AppResult<bool> {
    if user.is(booking.customer_id) || user.email_matches(&booking.customer_email) {
        return Ok(true);
    }
    let ids = session_customer_ids(&state.orm, user).await?;
    Ok(ids.contains(&booking.customer_id))
}

/// Owner of the booking, or an operator token.
pub(crate) async fn ensure_owner(
    state: &AppState,
    user: &AuthUser,
    booking: &BookingModel,
) -> AppResult<()> {
    if ensure_operator(user).is_ok() || owns_booking(state, user, booking).await? {
        return Ok(());
    }
    tracing::warn!(user_id = ?user.user_id, booking_id = %booking.id, "booking access denied");
    Err(AppError::Forbidden)
}

pub(crate) async fn find_booking<C: ConnectionTrait>(
    conn: &C,
    target: &BookingRef,
    lock: bool,
) -> AppResult<BookingModel> {
    target.validate()?;
    let mut finder = Bookings::find();
    finder = match (target.id, target.code.as_deref()) {
        (Some(id), _) => finder.filter(BookingCol::Id.eq(id)),
        (None, Some(code)) => finder.filter(BookingCol::BookingCode.eq(code.trim())),
        (None, None) => return Err(AppError::MissingField("id or code".into())),
    };
    if lock {
        finder = finder.lock(LockType::Update);
    }
    finder.one(conn).await?.ok_or(AppError::BookingNotFound)
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
) -> AppResult<Vec<ItemModel>> {
    let items = BookingItems::find()
        .filter(ItemCol::BookingId.eq(booking_id))
        .order_by_asc(ItemCol::ItemDate)
        .order_by_asc(ItemCol::CreatedAt)
        .order_by_asc(ItemCol::Id)
        .all(conn)
        .await?;
    Ok(items)
}

pub(crate) fn with_items(booking: BookingModel, items: Vec<ItemModel>) -> BookingWithItems {
    BookingWithItems {
        booking: Booking::from(booking),
        items: items.into_iter().map(BookingItem::from).collect(),
    }
}

/// Everything a read projection needs, loaded once for a set of bookings.
#[derive(Default)]
pub(crate) struct BookingGraph {
    items: HashMap<Uuid, Vec<ItemModel>>,
    schedules: HashMap<Uuid, ScheduleModel>,
    products: HashMap<Uuid, ProductModel>,
    boats: HashMap<Uuid, BoatModel>,
    tenants: HashMap<Uuid, TenantModel>,
    inventories: HashMap<Uuid, InventoryModel>,
    reviews: HashMap<Uuid, ReviewModel>,
}

impl BookingGraph {
    pub async fn load<C: ConnectionTrait>(conn: &C, bookings: &[BookingModel]) -> AppResult<Self> {
        if bookings.is_empty() {
            return Ok(Self::default());
        }
        let booking_ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();

        let mut items: HashMap<Uuid, Vec<ItemModel>> = HashMap::new();
        for item in BookingItems::find()
            .filter(ItemCol::BookingId.is_in(booking_ids.clone()))
            .order_by_asc(ItemCol::ItemDate)
            .order_by_asc(ItemCol::CreatedAt)
            .order_by_asc(ItemCol::Id)
            .all(conn)
            .await?
        {
            items.entry(item.booking_id).or_default().push(item);
        }

        let all_items = items.values().flatten();
        let schedule_ids: HashSet<Uuid> = all_items.clone().map(|i| i.schedule_id).collect();
        let product_ids: HashSet<Uuid> = all_items.clone().map(|i| i.product_id).collect();
        let inventory_ids: HashSet<Uuid> = all_items.filter_map(|i| i.inventory_id).collect();

        let schedules: HashMap<Uuid, ScheduleModel> = Schedules::find()
            .filter(ScheduleCol::Id.is_in(schedule_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let products: HashMap<Uuid, ProductModel> = Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let boat_ids: HashSet<Uuid> = schedules.values().filter_map(|s| s.boat_id).collect();
        let boats = Boats::find()
            .filter(BoatCol::Id.is_in(boat_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();
        let tenant_ids: HashSet<Uuid> = bookings.iter().map(|b| b.tenant_id).collect();
        let tenants = Tenants::find()
            .filter(TenantCol::Id.is_in(tenant_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let inventories = Inventories::find()
            .filter(InvCol::Id.is_in(inventory_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        let reviews = Reviews::find()
            .filter(ReviewCol::BookingId.is_in(booking_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|r| (r.booking_id, r))
            .collect();

        Ok(Self {
            items,
            schedules,
            products,
            boats,
            tenants,
            inventories,
            reviews,
        })
    }

    fn items_of(&self, booking_id: Uuid) -> &[ItemModel] {
        self.items.get(&booking_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest_arrival(&self, booking_id: Uuid, policy: &BookingPolicy) -> Option<DateTime<Utc>> {
        let contexts: Vec<ItemContext<'_>> = self
            .items_of(booking_id)
            .iter()
            .map(|item| ItemContext {
                item,
                schedule: self.schedules.get(&item.schedule_id),
            })
            .collect();
        projection::latest_arrival(&contexts, &policy.timezone())
    }

    pub fn card(&self, booking: &BookingModel, policy: &BookingPolicy) -> BookingCard {
        let items = self.items_of(booking.id);
        let contexts: Vec<ItemContext<'_>> = items
            .iter()
            .map(|item| ItemContext {
                item,
                schedule: self.schedules.get(&item.schedule_id),
            })
            .collect();

        // the card describes the first leg
        let lead = items
            .iter()
            .find(|i| LegRole::from_column(&i.leg_role) != LegRole::Inbound)
            .or_else(|| items.first());
        let product_name = lead
            .and_then(|i| self.products.get(&i.product_id))
            .map(|p| p.name.as_str());
        let boat_name = lead
            .and_then(|i| self.schedules.get(&i.schedule_id))
            .and_then(|s| s.boat_id)
            .and_then(|id| self.boats.get(&id))
            .map(|b| b.name.as_str());
        let vendor_name = self.tenants.get(&booking.tenant_id).map(|t| t.name.as_str());

        let ctx = CardContext {
            booking,
            items: contexts,
            product_name,
            boat_name,
            vendor_name,
            has_review: self.reviews.contains_key(&booking.id),
        };
        projection::build_card(&ctx, &policy.timezone(), policy.payment_window)
    }

    pub fn detail(&self, booking: BookingModel, policy: &BookingPolicy) -> BookingDetail {
        let card = self.card(&booking, policy);
        let items = self
            .items_of(booking.id)
            .iter()
            .map(|item| BookingItemDetail {
                item: item.clone().into(),
                product: self.products.get(&item.product_id).cloned().map(Into::into),
                schedule: self.schedules.get(&item.schedule_id).cloned().map(Into::into),
                inventory: item
                    .inventory_id
                    .and_then(|id| self.inventories.get(&id))
                    .cloned()
                    .map(Into::into),
            })
            .collect();

        BookingDetail {
            tenant: self.tenants.get(&booking.tenant_id).cloned().map(Into::into),
            review: self.reviews.get(&booking.id).cloned().map(Into::into),
            booking: booking.into(),
            items,
            card,
        }
    }
}

/// A leg after its schedule, product and date have been resolved.
struct ResolvedLeg {
    schedule: ScheduleModel,
    product: ProductModel,
    date: NaiveDate,
    role: LegRole,
    base_price: i64,
    note: Option<String>,
}

struct PassengerDraft {
    name: String,
    category: AgeCategory,
    details: Value,
}

/// Refuse departures in the past or closer than the booking cutoff.
fn ensure_bookable(
    label: &str,
    date: NaiveDate,
    schedule: &ScheduleModel,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let tz = policy.timezone();
    match timing::departure_at(date, &schedule.departure_time, &tz) {
        Some(departure) if departure - now < policy.booking_cutoff => {
            Err(AppError::BookingClosed(format!(
                "{label} departs at {}, bookings close {} minutes before departure",
                departure.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                policy.booking_cutoff.num_minutes()
            )))
        }
        Some(_) => Ok(()),
        None if date < now.with_timezone(&tz).date_naive() => Err(AppError::BookingClosed(
            format!("{label} departure date {date} has passed"),
        )),
        None => Ok(()),
    }
}

fn passenger_drafts(
    payload: &CreateBookingRequest,
    contact: &ContactInput,
    fallback_name: &str,
    max_passengers: usize,
) -> AppResult<Vec<PassengerDraft>> {
    let party_size = if payload.passengers.is_empty() {
        usize::try_from(payload.guest_count.unwrap_or(0)).unwrap_or(0)
    } else {
        payload.passengers.len()
    };
    if party_size > max_passengers {
        return Err(AppError::BadRequest(format!(
            "{party_size} passengers requested, a booking holds at most {max_passengers}"
        )));
    }

    let passengers: Vec<PassengerInput> = if payload.passengers.is_empty() {
        let (first, last) = (contact.first_name.clone(), contact.last_name.clone());
        (0..party_size)
            .map(|_| PassengerInput {
                first_name: first.clone(),
                last_name: last.clone(),
                ..PassengerInput::default()
            })
            .collect()
    } else {
        payload.passengers.clone()
    };

    if passengers.is_empty() {
        return Err(AppError::MissingField("passengers".into()));
    }

    Ok(passengers
        .iter()
        .enumerate()
        .map(|(index, p)| {
            let name = Some(p.full_name())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| {
                    if fallback_name.is_empty() {
                        format!("Passenger {}", index + 1)
                    } else {
                        fallback_name.to_string()
                    }
                });
            let category = AgeCategory::parse(p.age_category.as_deref());
            let details = json!({
                "title": p.title,
                "name": name,
                "nationality": p.nationality,
                "identityType": p.identity_type,
                "idNumber": p.id_number,
                "ageCategory": category.as_str(),
            });
            PassengerDraft {
                name,
                category,
                details,
            }
        })
        .collect())
}

/// Per item metadata; `notes` keeps the leg tag as a JSON string for older readers.
fn special_requirements(passenger: &PassengerDraft, leg: &ResolvedLeg) -> Value {
    let mut details = passenger.details.clone();
    let notes = json!({ "rtType": leg.role.as_str(), "note": leg.note }).to_string();
    if let Value::Object(map) = &mut details {
        map.insert("notes".into(), Value::String(notes));
    }
    details
}

async fn resolve_customer(
    state: &AppState,
    user: &AuthUser,
    payload: &CreateBookingRequest,
) -> AppResult<UserModel> {
    // operators may book on behalf of a customer
    if ensure_operator(user).is_ok() {
        if let Some(id) = payload.owner_id {
            return Users::find_by_id(id)
                .one(&state.orm)
                .await?
                .ok_or(AppError::UserNotFound);
        }
        if let Some(email) = payload.owner_email.as_deref() {
            return find_user_by_email(&state.orm, email)
                .await?
                .ok_or(AppError::UserNotFound);
        }
    }

    if let Some(user_id) = user.user_id {
        if let Some(account) = Users::find_by_id(user_id).one(&state.orm).await? {
            return Ok(account);
        }
    }
    if let Some(email) = user.email.as_deref() {
        if let Some(account) = find_user_by_email(&state.orm, email).await? {
            return Ok(account);
        }
    }
    Err(AppError::UserNotFound)
}

async fn resolve_leg(
    state: &AppState,
    index: usize,
    leg_count: usize,
    leg: &LegInput,
    party: i32,
    now: DateTime<Utc>,
) -> AppResult<ResolvedLeg> {
    let label = format!("leg {}", index + 1);
    let schedule_id = leg
        .schedule_id
        .ok_or_else(|| AppError::ScheduleNotFound(label.clone()))?;
    let raw_date = leg
        .departure_date
        .as_deref()
        .ok_or_else(|| AppError::MissingField(format!("departureDate of {label}")))?;
    let date = parse_travel_date(raw_date)?;

    let schedule = Schedules::find_by_id(schedule_id)
        .one(&state.orm)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::ScheduleNotFound(label.clone()))?;
    let product = Products::find_by_id(schedule.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::ScheduleNotFound(label.clone()))?;

    ensure_bookable(&label, date, &schedule, &state.config.policy, now)?;
    if let Some(inventory_id) = leg.inventory_id {
        let hinted = Inventories::find_by_id(inventory_id).one(&state.orm).await?;
        if !hinted.is_some_and(|l| l.product_id == product.id && l.inventory_date == date) {
            return Err(AppError::BadRequest(format!(
                "inventoryId of {label} does not belong to its schedule and date"
            )));
        }
    }
    inventory_service::check_availability(&state.orm, product.id, date, party).await?;

    let role = leg
        .rt_type
        .as_deref()
        .and_then(LegRole::parse)
        .unwrap_or_else(|| LegRole::by_position(index, leg_count));
    let base_price = leg
        .price_idr
        .filter(|p| *p > 0)
        .unwrap_or(schedule.price_idr);

    Ok(ResolvedLeg {
        schedule,
        product,
        date,
        role,
        base_price,
        note: leg.notes.clone().filter(|n| !n.trim().is_empty()),
    })
}

pub async fn create_booking(
    state: &AppState,
    user: Option<&AuthUser>,
    payload: CreateBookingRequest,
) -> AppResult<BookingWithItems> {
    let user = user.ok_or(AppError::LoginRequired)?;
    let customer = resolve_customer(state, user, &payload).await?;

    let legs = payload.resolved_legs();
    if legs.is_empty() {
        return Err(AppError::MissingField("legs".into()));
    }
    if legs.len() > 2 {
        return Err(AppError::MissingField("legs (at most two)".into()));
    }
    let currency = Currency::parse(payload.currency.as_deref())?;

    let contact = payload.contact.clone().unwrap_or_default();
    let contact_name = Some(contact.full_name())
        .filter(|n| !n.is_empty())
        .or_else(|| customer.full_name.clone())
        .unwrap_or_else(|| customer.email.clone());
    let policy = &state.config.policy;
    let passengers = passenger_drafts(&payload, &contact, &contact_name, policy.max_passengers)?;
    let party = i32::try_from(passengers.len())
        .map_err(|_| AppError::BadRequest("too many passengers".into()))?;

    let now = Utc::now();

    let mut resolved = Vec::with_capacity(legs.len());
    for (index, leg) in legs.iter().enumerate() {
        resolved.push(resolve_leg(state, index, legs.len(), leg, party, now).await?);
    }

    let mut drafts: Vec<(usize, &PassengerDraft, i64)> = Vec::new();
    for (leg_index, leg) in resolved.iter().enumerate() {
        for passenger in &passengers {
            let price = pricing::unit_price(leg.base_price, passenger.category, policy.child_discount_percent)
                .ok_or_else(|| AppError::BadRequest(format!("priceIdr of leg {} is too large", leg_index + 1)))?;
            drafts.push((leg_index, passenger, price));
        }
    }
    let subtotals: Vec<i64> = drafts.iter().map(|(_, _, price)| *price).collect();
    let port_fee = payload.port_fee.unwrap_or(0).max(0);
    let total_amount = pricing::booking_total(&subtotals, port_fee, payload.total_amount)
        .ok_or_else(|| AppError::BadRequest("booking total is too large".into()))?;

    let booking_date = resolved.iter().map(|l| l.date).min().unwrap_or(now.date_naive());
    let round_trip = resolved.iter().any(|l| l.role == LegRole::Inbound);
    let customer_notes = json!({
        "tripType": if round_trip { "ROUND_TRIP" } else { "ONE_WAY" },
        "isDoubleTrip": round_trip,
        "specialRequests": contact.special_requests,
    })
    .to_string();
    let email = contact
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| customer.email.clone());
    let phone = pricing::normalize_phone(
        contact.country_code.as_deref(),
        contact.phone.as_deref().or(customer.phone.as_deref()),
    );

    let txn = state.orm.begin().await?;

    let booking = BookingActive {
        id: Set(Uuid::new_v4()),
        booking_code: Set(pricing::generate_booking_code(now)),
        customer_id: Set(customer.id),
        tenant_id: Set(resolved[0].product.tenant_id),
        status: Set("PENDING".into()),
        pending_type: Set(None),
        currency: Set(currency.as_str().into()),
        total_amount: Set(total_amount),
        port_fee: Set(port_fee),
        booking_date: Set(booking_date),
        customer_name: Set(contact_name),
        customer_email: Set(email.trim().to_string()),
        customer_phone: Set(phone),
        customer_notes: Set(Some(customer_notes)),
        payment_method: Set(None),
        paid_amount: Set(None),
        paid_at: Set(None),
        xendit_invoice_id: Set(None),
        xendit_payment_channel: Set(None),
        invoice_expiry_date: Set(Some(timing::payment_deadline(now, policy.payment_window).into())),
        cancelled_at: Set(None),
        cancellation_reason: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(drafts.len());
    for (leg_index, passenger, price) in drafts {
        let leg = &resolved[leg_index];
        let item = ItemActive {
            id: Set(Uuid::new_v4()),
            booking_id: Set(booking.id),
            product_id: Set(leg.product.id),
            schedule_id: Set(leg.schedule.id),
            inventory_id: Set(None),
            leg_role: Set(leg.role.as_str().into()),
            unit_price: Set(price),
            quantity: Set(1),
            item_date: Set(leg.date),
            subtotal: Set(price),
            participant_name: Set(passenger.name.clone()),
            special_requirements: Set(Some(special_requirements(passenger, leg))),
            is_cancelled: Set(false),
            cancelled_at: Set(None),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(item);
    }

    if state.mirror_enabled() {
        mirror::enqueue(&txn, "bookings", &booking).await?;
        mirror::enqueue_all(&txn, "booking_items", &items).await?;
    }

    txn.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        booking_code = %booking.booking_code,
        legs = resolved.len(),
        passengers = party,
        total_amount,
        "booking created"
    );
    record_booking_event(
        &state.pool,
        user.user_id,
        "booking_created",
        booking.id,
        json!({ "booking_code": booking.booking_code, "total_amount": total_amount }),
    )
    .await;

    Ok(with_items(booking, items))
}

pub async fn get_booking(
    state: &AppState,
    user: Option<&AuthUser>,
    target: BookingRef,
    simulate: bool,
) -> AppResult<BookingDetail> {
    let booking = find_booking(&state.orm, &target, false).await?;

    let simulated = simulate && state.config.simulation_enabled();
    if !simulated {
        let user = user.ok_or(AppError::LoginRequired)?;
        ensure_owner(state, user, &booking).await?;
    }

    lifecycle_service::sweep_owner(state, &[booking.customer_id], Some(&booking.customer_email)).await;
    let booking = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::BookingNotFound)?;

    let graph = BookingGraph::load(&state.orm, std::slice::from_ref(&booking)).await?;
    Ok(graph.detail(booking, &state.config.policy))
}

pub async fn list_bookings(
    state: &AppState,
    user: &AuthUser,
    user_id: Option<Uuid>,
    email: Option<&str>,
) -> AppResult<BookingCardList> {
    if user_id.is_some_and(|id| !user.is(id)) {
        return Err(AppError::Forbidden);
    }
    if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
        if !user.email_matches(email) {
            return Err(AppError::Forbidden);
        }
    }

    let ids = session_customer_ids(&state.orm, user).await?;
    lifecycle_service::sweep_owner(state, &ids, user.email.as_deref()).await;

    let mut owned = Condition::any().add(BookingCol::CustomerId.is_in(ids));
    if let Some(email) = user.email.as_deref() {
        owned = owned.add(email_eq(BookingCol::CustomerEmail, email));
    }
    let bookings = Bookings::find()
        .filter(owned)
        .order_by_desc(BookingCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let graph = BookingGraph::load(&state.orm, &bookings).await?;
    let policy = &state.config.policy;
    Ok(BookingCardList {
        bookings: bookings.iter().map(|b| graph.card(b, policy)).collect(),
    })
}
