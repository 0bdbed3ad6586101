use chrono::{Duration, NaiveDate, Utc};
use fastboat_booking_api::{
    config::{AppConfig, BookingPolicy},
    db::{connect, run_migrations},
    domain::BookingStatus,
    dto::{
        bookings::{
            BookingRef, BookingWithItems, ContactInput, CreateBookingRequest, LegInput,
            PassengerInput, PaymentDetails,
        },
        reviews::CreateReviewRequest,
    },
    entity::{
        boats::ActiveModel as BoatActive,
        booking_items::{Column as ItemCol, Entity as BookingItems},
        bookings::{Column as BookingCol, Entity as Bookings},
        products::{ActiveModel as ProductActive, Entity as Products, Model as ProductModel},
        schedules::{ActiveModel as ScheduleActive, Model as ScheduleModel},
        tenants::ActiveModel as TenantActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::{AuthUser, SERVICE_ROLE},
    services::{
        booking_service, inventory_service, lifecycle_service, payment_service, review_service,
    },
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, Statement};
use tokio::sync::Mutex;
use uuid::Uuid;

// Every test truncates the same tables, so they run one at a time.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

struct Fixture {
    state: AppState,
    tenant_id: Uuid,
    boat_id: Uuid,
}

async fn setup() -> anyhow::Result<Option<Fixture>> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL to run booking flow tests.");
            return Ok(None);
        }
    };

    let (pool, orm) = connect(&database_url).await?;
    run_migrations(&orm).await?;
    orm.execute(Statement::from_string(
        orm.get_database_backend(),
        "TRUNCATE TABLE reviews, booking_items, bookings, inventories, schedules, boats, products, \
         tenants, users, audit_logs, mirror_outbox CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        app_env: "test".into(),
        jwt_secret: "test-secret".into(),
        allow_payment_simulation: true,
        sweep_interval_secs: 0,
        mirror: None,
        policy: BookingPolicy::default(),
    };
    let state = AppState::new(pool, orm, config);

    let tenant = TenantActive {
        id: Set(Uuid::new_v4()),
        name: Set("Bali Blue Fastboat".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    let boat = BoatActive {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant.id),
        name: Set("Blue Marlin".into()),
        capacity: Set(40),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(Some(Fixture {
        state,
        tenant_id: tenant.id,
        boat_id: boat.id,
    }))
}

impl Fixture {
    async fn customer(&self, email: &str) -> anyhow::Result<AuthUser> {
        let user = UserActive {
            id: Set(Uuid::new_v4()),
            email: Set(email.into()),
            full_name: Set(Some("Made Wijaya".into())),
            phone: Set(None),
            created_at: NotSet,
        }
        .insert(&self.state.orm)
        .await?;
        Ok(AuthUser {
            user_id: Some(user.id),
            email: Some(user.email),
            role: "authenticated".into(),
        })
    }

    async fn route(
        &self,
        from: &str,
        to: &str,
        price_idr: i64,
        capacity: Option<i32>,
    ) -> anyhow::Result<(ProductModel, ScheduleModel)> {
        let product = ProductActive {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            name: Set(format!("{from} - {to} {}", Uuid::new_v4().simple())),
            location: Set(Some(from.into())),
            total_bookings: Set(0),
            review_count: Set(0),
            created_at: NotSet,
        }
        .insert(&self.state.orm)
        .await?;
        let schedule = ScheduleActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            boat_id: Set(Some(self.boat_id)),
            departure_port: Set(from.into()),
            arrival_port: Set(to.into()),
            departure_time: Set("08:00".into()),
            arrival_time: Set("08:45".into()),
            capacity: Set(capacity),
            price_idr: Set(price_idr),
            is_active: Set(true),
            created_at: NotSet,
        }
        .insert(&self.state.orm)
        .await?;
        Ok((product, schedule))
    }
}

/// A service-role key: operator rights, no user id.
fn operator() -> AuthUser {
    AuthUser {
        user_id: None,
        email: None,
        role: SERVICE_ROLE.into(),
    }
}

fn travel_day() -> NaiveDate {
    (Utc::now() + Duration::days(3)).date_naive()
}

fn adult(first: &str) -> PassengerInput {
    PassengerInput {
        first_name: Some(first.into()),
        last_name: Some("Wijaya".into()),
        age_category: Some("adult".into()),
        ..PassengerInput::default()
    }
}

fn child(first: &str) -> PassengerInput {
    PassengerInput {
        age_category: Some("child".into()),
        ..adult(first)
    }
}

fn one_way(schedule: &ScheduleModel, day: NaiveDate, passengers: Vec<PassengerInput>) -> CreateBookingRequest {
    CreateBookingRequest {
        legs: vec![LegInput {
            schedule_id: Some(schedule.id),
            departure_date: Some(day.format("%Y-%m-%d").to_string()),
            ..LegInput::default()
        }],
        contact: Some(ContactInput {
            first_name: Some("Made".into()),
            last_name: Some("Wijaya".into()),
            country_code: Some("62".into()),
            phone: Some("081234567890".into()),
            ..ContactInput::default()
        }),
        passengers,
        ..CreateBookingRequest::default()
    }
}

fn by_id(created: &BookingWithItems) -> BookingRef {
    BookingRef {
        id: Some(created.booking.id),
        code: None,
    }
}

async fn pay(state: &AppState, user: &AuthUser, created: &BookingWithItems) -> Result<BookingWithItems, AppError> {
    payment_service::pay_booking(state, Some(user), &by_id(created), PaymentDetails {
        payment_method: Some("BANK_TRANSFER".into()),
        ..PaymentDetails::default()
    })
    .await
}

async fn total_bookings(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product missing"))?;
    Ok(product.total_bookings)
}

async fn ledger(state: &AppState, product_id: Uuid, day: NaiveDate) -> anyhow::Result<(i32, i32, i32)> {
    let row = inventory_service::find_ledger(&state.orm, product_id, day)
        .await?
        .ok_or_else(|| anyhow::anyhow!("ledger row missing"))?;
    Ok((row.total_capacity, row.booked_units, row.available_units))
}

#[tokio::test]
async fn round_trip_with_child_is_priced_per_leg_and_passenger() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, outbound) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let (_, inbound) = fx.route("Nusa Penida", "Sanur", 120_000, Some(40)).await?;
    let day = travel_day();

    let mut payload = one_way(&outbound, day, vec![adult("Made"), child("Komang")]);
    payload.legs.push(LegInput {
        schedule_id: Some(inbound.id),
        departure_date: Some((day + Duration::days(2)).format("%Y-%m-%d").to_string()),
        ..LegInput::default()
    });
    payload.port_fee = Some(20_000);

    let created = booking_service::create_booking(&fx.state, Some(&user), payload).await?;
    let prices: Vec<i64> = created.items.iter().map(|i| i.unit_price).collect();
    assert_eq!(prices, vec![100_000, 75_000, 120_000, 90_000]);
    assert_eq!(created.booking.total_amount, 385_000 + 20_000);
    assert_eq!(created.booking.status, "PENDING");
    assert_eq!(created.booking.customer_phone, "+6281234567890");
    assert_eq!(created.items[0].leg_role, "OUTBOUND");
    assert_eq!(created.items[3].leg_role, "INBOUND");
    assert!(created.items.iter().all(|i| i.inventory_id.is_none()));

    let detail = booking_service::get_booking(&fx.state, Some(&user), by_id(&created), false).await?;
    assert!(detail.card.is_double_trip);
    assert_eq!(detail.card.passengers.outbound, 2);
    assert_eq!(detail.card.passengers.inbound, 2);
    Ok(())
}

#[tokio::test]
async fn pay_creates_ledger_lazily_and_is_idempotent() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let day = travel_day();

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, day, vec![adult("Made"), adult("Putu"), child("Komang")]),
    )
    .await?;
    assert!(inventory_service::find_ledger(&fx.state.orm, product.id, day).await?.is_none());

    let paid = pay(&fx.state, &user, &created).await?;
    assert_eq!(paid.booking.status, "PAID");
    assert!(paid.items.iter().all(|i| i.inventory_id.is_some()));
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 3, 37));

    let again = pay(&fx.state, &user, &created).await?;
    assert_eq!(again.booking.status, "PAID");
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 3, 37));

    assert_eq!(total_bookings(&fx.state, product.id).await?, 3);
    Ok(())
}

#[tokio::test]
async fn cancel_gives_every_seat_back() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(10)).await?;
    let day = travel_day();

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, day, vec![adult("Made"), adult("Putu")]),
    )
    .await?;
    pay(&fx.state, &user, &created).await?;
    assert_eq!(ledger(&fx.state, product.id, day).await?, (10, 2, 8));
    assert_eq!(total_bookings(&fx.state, product.id).await?, 2);

    let cancelled =
        lifecycle_service::cancel_booking(&fx.state, &user, &by_id(&created), Some("Change of plans")).await?;
    assert_eq!(cancelled.booking.status, "CANCELLED");
    assert_eq!(cancelled.booking.cancellation_reason.as_deref(), Some("Change of plans"));
    assert!(cancelled.booking.cancelled_at.is_some());
    assert_eq!(ledger(&fx.state, product.id, day).await?, (10, 0, 10));
    assert_eq!(total_bookings(&fx.state, product.id).await?, 0);

    // repeated cancel is a no-op
    lifecycle_service::cancel_booking(&fx.state, &user, &by_id(&created), None).await?;
    assert_eq!(ledger(&fx.state, product.id, day).await?, (10, 0, 10));
    assert_eq!(total_bookings(&fx.state, product.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn refunding_one_item_releases_only_its_seat() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let day = travel_day();

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, day, vec![adult("Made"), adult("Putu")]),
    )
    .await?;
    pay(&fx.state, &user, &created).await?;
    let first = created.items[0].id;
    let second = created.items[1].id;

    let partial = lifecycle_service::refund_item(&fx.state, &user, &by_id(&created), first).await?;
    assert_eq!(partial.booking.status, "PENDING");
    assert_eq!(partial.booking.pending_type.as_deref(), Some("refund"));
    assert_eq!(partial.booking.cancellation_reason.as_deref(), Some("Partial refund"));
    assert!(partial.booking.invoice_expiry_date.is_none());
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 1, 39));
    let untouched = partial
        .items
        .iter()
        .find(|i| i.id == second)
        .ok_or_else(|| anyhow::anyhow!("second item missing"))?;
    assert!(!untouched.is_cancelled);
    assert!(untouched.inventory_id.is_some());

    // the same item again changes nothing
    lifecycle_service::refund_item(&fx.state, &user, &by_id(&created), first).await?;
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 1, 39));

    let full = lifecycle_service::refund_item(&fx.state, &user, &by_id(&created), second).await?;
    assert_eq!(full.booking.status, "REFUNDED");
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 0, 40));
    Ok(())
}

#[tokio::test]
async fn unpaid_booking_expires_after_its_deadline() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, travel_day(), vec![adult("Made")]),
    )
    .await?;

    let created_at = Utc::now() - Duration::minutes(31);
    Bookings::update_many()
        .col_expr(BookingCol::CreatedAt, Expr::value(created_at))
        .col_expr(BookingCol::InvoiceExpiryDate, Expr::value(Utc::now() - Duration::minutes(16)))
        .filter(BookingCol::Id.eq(created.booking.id))
        .exec(&fx.state.orm)
        .await?;

    let list = booking_service::list_bookings(&fx.state, &user, None, None).await?;
    assert_eq!(list.bookings.len(), 1);
    assert_eq!(list.bookings[0].status, BookingStatus::Expired);

    let expired = Bookings::find_by_id(created.booking.id)
        .one(&fx.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("booking missing"))?;
    assert_eq!(expired.cancellation_reason.as_deref(), Some("Expired payment deadline"));
    assert!(expired.cancelled_at.is_some());

    let err = pay(&fx.state, &user, &created).await.err();
    assert!(matches!(err, Some(AppError::InvalidStatus(_))));
    Ok(())
}

#[tokio::test]
async fn reviews_require_a_completed_trip() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let stranger = fx.customer("stranger@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, travel_day(), vec![adult("Made")]),
    )
    .await?;
    pay(&fx.state, &user, &created).await?;

    let review = |rating: i16| CreateReviewRequest {
        booking_id: Some(created.booking.id),
        rating: Some(rating),
        title: Some("Smooth crossing".into()),
        comment: None,
        service_rating: None,
        value_rating: None,
        location_rating: None,
    };

    let early = review_service::create_review(&fx.state, Some(&user), review(5)).await.err();
    assert!(matches!(early, Some(AppError::InvalidState(_))));

    lifecycle_service::complete_booking(&fx.state, &user, &by_id(&created)).await?;

    let foreign = review_service::create_review(&fx.state, Some(&stranger), review(5)).await.err();
    assert!(matches!(foreign, Some(AppError::Forbidden)));

    let (stored, created_now) = review_service::create_review(&fx.state, Some(&user), review(5)).await?;
    assert!(created_now);
    assert_eq!(stored.review.sentiment_label, "positive");
    assert!((stored.review.score_sentiment - 1.0).abs() < 1e-9);

    let (again, created_again) = review_service::create_review(&fx.state, Some(&user), review(1)).await?;
    assert!(!created_again);
    assert_eq!(again.review.id, stored.review.id);

    let top = review_service::top_reviews(&fx.state, review_service::TOP_REVIEW_LIMIT).await?;
    assert_eq!(top.reviews.len(), 1);
    assert_eq!(top.reviews[0].product_name.as_deref(), Some(product.name.as_str()));

    let product = Products::find_by_id(product.id)
        .one(&fx.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product missing"))?;
    assert_eq!(product.review_count, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_pays_never_oversell() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let first_user = fx.customer("made@example.com").await?;
    let second_user = fx.customer("putu@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(3)).await?;
    let day = travel_day();

    let first = booking_service::create_booking(
        &fx.state,
        Some(&first_user),
        one_way(&schedule, day, vec![adult("Made"), adult("Wayan")]),
    )
    .await?;
    let second = booking_service::create_booking(
        &fx.state,
        Some(&second_user),
        one_way(&schedule, day, vec![adult("Putu"), adult("Ketut")]),
    )
    .await?;

    let (a, b) = tokio::join!(
        pay(&fx.state, &first_user, &first),
        pay(&fx.state, &second_user, &second)
    );
    let outcomes = [a, b];
    let paid = outcomes.iter().filter(|r| r.is_ok()).count();
    let refused = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::InsufficientCapacity(_))))
        .count();
    assert_eq!((paid, refused), (1, 1));
    assert_eq!(ledger(&fx.state, product.id, day).await?, (3, 2, 1));
    Ok(())
}

#[tokio::test]
async fn simulated_payment_must_match_the_total() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, travel_day(), vec![adult("Made")]),
    )
    .await?;

    let simulated = |amount: i64| PaymentDetails {
        paid_amount: Some(amount),
        simulate: true,
        ..PaymentDetails::default()
    };

    let err = payment_service::pay_booking(&fx.state, None, &by_id(&created), simulated(1))
        .await
        .err();
    assert!(matches!(err, Some(AppError::InvalidAmount(_))));

    let paid = payment_service::pay_booking(
        &fx.state,
        None,
        &by_id(&created),
        simulated(created.booking.total_amount),
    )
    .await?;
    assert_eq!(paid.booking.status, "PAID");
    assert_eq!(paid.booking.paid_amount, Some(100_000));
    Ok(())
}

#[tokio::test]
async fn leg_without_schedule_is_not_found() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;

    let mut payload = one_way(&schedule, travel_day(), vec![adult("Made")]);
    payload.legs[0].schedule_id = None;
    let err = booking_service::create_booking(&fx.state, Some(&user), payload).await.err();
    assert!(matches!(err, Some(AppError::ScheduleNotFound(ref leg)) if leg == "leg 1"));

    let mut payload = one_way(&schedule, travel_day(), vec![adult("Made")]);
    payload.legs.push(LegInput {
        schedule_id: Some(Uuid::new_v4()),
        departure_date: Some(travel_day().format("%Y-%m-%d").to_string()),
        ..LegInput::default()
    });
    let err = booking_service::create_booking(&fx.state, Some(&user), payload).await.err();
    assert!(matches!(err, Some(AppError::ScheduleNotFound(ref leg)) if leg == "leg 2"));
    Ok(())
}

#[tokio::test]
async fn inventory_hint_must_match_the_leg() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let day = travel_day();

    let first = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, day, vec![adult("Made")]),
    )
    .await?;
    let paid = pay(&fx.state, &user, &first).await?;
    let ledger_id = paid.items[0]
        .inventory_id
        .ok_or_else(|| anyhow::anyhow!("ledger link missing"))?;

    let mut matching = one_way(&schedule, day, vec![adult("Putu")]);
    matching.legs[0].inventory_id = Some(ledger_id);
    let created = booking_service::create_booking(&fx.state, Some(&user), matching).await?;
    assert!(created.items.iter().all(|i| i.inventory_id.is_none()));

    let mut other_day = one_way(&schedule, day + Duration::days(1), vec![adult("Putu")]);
    other_day.legs[0].inventory_id = Some(ledger_id);
    let err = booking_service::create_booking(&fx.state, Some(&user), other_day).await.err();
    assert!(matches!(err, Some(AppError::BadRequest(_))));

    let mut unknown = one_way(&schedule, day, vec![adult("Putu")]);
    unknown.legs[0].inventory_id = Some(Uuid::new_v4());
    let err = booking_service::create_booking(&fx.state, Some(&user), unknown).await.err();
    assert!(matches!(err, Some(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn create_requires_a_known_customer() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let payload = || one_way(&schedule, travel_day(), vec![adult("Made")]);

    let err = booking_service::create_booking(&fx.state, None, payload()).await.err();
    assert!(matches!(err, Some(AppError::LoginRequired)));

    let unknown = AuthUser {
        user_id: Some(Uuid::new_v4()),
        email: Some("nobody@example.com".into()),
        role: "authenticated".into(),
    };
    let err = booking_service::create_booking(&fx.state, Some(&unknown), payload()).await.err();
    assert!(matches!(err, Some(AppError::UserNotFound)));

    let mut crowd = payload();
    crowd.passengers = Vec::new();
    crowd.guest_count = Some(2_000_000);
    let user = fx.customer("made@example.com").await?;
    let err = booking_service::create_booking(&fx.state, Some(&user), crowd).await.err();
    assert!(matches!(err, Some(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn strangers_cannot_pay_or_cancel() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let stranger = fx.customer("stranger@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let day = travel_day();

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, day, vec![adult("Made")]),
    )
    .await?;

    let err = pay(&fx.state, &stranger, &created).await.err();
    assert!(matches!(err, Some(AppError::Forbidden)));
    assert!(inventory_service::find_ledger(&fx.state.orm, product.id, day).await?.is_none());

    pay(&fx.state, &user, &created).await?;
    let err = lifecycle_service::cancel_booking(&fx.state, &stranger, &by_id(&created), None)
        .await
        .err();
    assert!(matches!(err, Some(AppError::Forbidden)));
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 1, 39));

    let unchanged = Bookings::find_by_id(created.booking.id)
        .one(&fx.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("booking missing"))?;
    assert_eq!(unchanged.status, "PAID");
    Ok(())
}

#[tokio::test]
async fn operator_key_approves_a_requested_refund() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (product, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;
    let day = travel_day();

    let created = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, day, vec![adult("Made"), adult("Putu")]),
    )
    .await?;
    pay(&fx.state, &user, &created).await?;

    let requested =
        lifecycle_service::request_refund(&fx.state, &user, &by_id(&created), Some("Rough sea")).await?;
    assert_eq!(requested.booking.status, "PENDING");
    assert_eq!(requested.booking.pending_type.as_deref(), Some("refund"));
    assert_eq!(
        requested.booking.cancellation_reason.as_deref(),
        Some("Refund requested - Rough sea")
    );
    assert!(requested.booking.invoice_expiry_date.is_none());
    // a refund request alone keeps the seats
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 2, 38));

    let err = lifecycle_service::approve_refund(&fx.state, &user, &by_id(&created)).await.err();
    assert!(matches!(err, Some(AppError::Forbidden)));

    let approved = lifecycle_service::approve_refund(&fx.state, &operator(), &by_id(&created)).await?;
    assert_eq!(approved.booking.status, "REFUNDED");
    assert!(approved.booking.pending_type.is_none());
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 0, 40));
    assert_eq!(total_bookings(&fx.state, product.id).await?, 0);

    let again = lifecycle_service::approve_refund(&fx.state, &operator(), &by_id(&created)).await?;
    assert_eq!(again.booking.status, "REFUNDED");
    assert_eq!(ledger(&fx.state, product.id, day).await?, (40, 0, 40));
    Ok(())
}

#[tokio::test]
async fn operator_key_books_on_behalf_of_a_customer() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;

    let mut payload = one_way(&schedule, travel_day(), vec![adult("Made")]);
    payload.owner_email = Some("MADE@example.com".into());
    let created = booking_service::create_booking(&fx.state, Some(&operator()), payload).await?;
    assert_eq!(Some(created.booking.customer_id), user.user_id);

    let paid = pay(&fx.state, &operator(), &created).await?;
    assert_eq!(paid.booking.status, "PAID");

    let err = booking_service::create_booking(
        &fx.state,
        Some(&operator()),
        one_way(&schedule, travel_day(), vec![adult("Made")]),
    )
    .await
    .err();
    assert!(matches!(err, Some(AppError::UserNotFound)));
    Ok(())
}

#[tokio::test]
async fn paid_trip_completes_once_it_has_arrived() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(fx) = setup().await? else { return Ok(()) };
    let user = fx.customer("made@example.com").await?;
    let (_, schedule) = fx.route("Sanur", "Nusa Penida", 100_000, Some(40)).await?;

    let upcoming = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, travel_day(), vec![adult("Made")]),
    )
    .await?;
    pay(&fx.state, &user, &upcoming).await?;
    let travelled = booking_service::create_booking(
        &fx.state,
        Some(&user),
        one_way(&schedule, travel_day(), vec![adult("Made")]),
    )
    .await?;
    pay(&fx.state, &user, &travelled).await?;

    let two_days_ago = (Utc::now() - Duration::days(2)).date_naive();
    BookingItems::update_many()
        .col_expr(ItemCol::ItemDate, Expr::value(two_days_ago))
        .filter(ItemCol::BookingId.eq(travelled.booking.id))
        .exec(&fx.state.orm)
        .await?;
    Bookings::update_many()
        .col_expr(BookingCol::BookingDate, Expr::value(two_days_ago))
        .filter(BookingCol::Id.eq(travelled.booking.id))
        .exec(&fx.state.orm)
        .await?;

    let list = booking_service::list_bookings(&fx.state, &user, None, None).await?;
    let status_of = |id: Uuid| {
        list.bookings
            .iter()
            .find(|card| card.id == id)
            .map(|card| card.status)
    };
    assert_eq!(status_of(travelled.booking.id), Some(BookingStatus::Completed));
    assert_eq!(status_of(upcoming.booking.id), Some(BookingStatus::Paid));

    let stored = Bookings::find_by_id(travelled.booking.id)
        .one(&fx.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("booking missing"))?;
    assert_eq!(stored.status, "COMPLETED");
    Ok(())
}
