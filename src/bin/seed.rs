use fastboat_booking_api::{
    config::AppConfig,
    db::{connect, run_migrations},
};
use uuid::Uuid;

struct Route {
    product: &'static str,
    location: &'static str,
    departure_port: &'static str,
    arrival_port: &'static str,
    departure_time: &'static str,
    arrival_time: &'static str,
    price_idr: i64,
}

const ROUTES: &[Route] = &[
    Route {
        product: "Sanur - Nusa Penida Express",
        location: "Sanur",
        departure_port: "Sanur",
        arrival_port: "Nusa Penida",
        departure_time: "08:00",
        arrival_time: "08:45",
        price_idr: 100_000,
    },
    Route {
        product: "Nusa Penida - Sanur Express",
        location: "Nusa Penida",
        departure_port: "Nusa Penida",
        arrival_port: "Sanur",
        departure_time: "16:00",
        arrival_time: "16:45",
        price_idr: 100_000,
    },
    Route {
        product: "Padang Bai - Gili Trawangan",
        location: "Padang Bai",
        departure_port: "Padang Bai",
        arrival_port: "Gili Trawangan",
        departure_time: "09:00",
        arrival_time: "10:30",
        price_idr: 350_000,
    },
    Route {
        product: "Serangan - Nusa Lembongan",
        location: "Serangan",
        departure_port: "Serangan",
        arrival_port: "Nusa Lembongan",
        departure_time: "10:00",
        arrival_time: "10:40",
        price_idr: 150_000,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let (pool, orm) = connect(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let tenant_id = ensure_tenant(&pool, "Bali Blue Fastboat").await?;
    let boat_id = ensure_boat(&pool, tenant_id, "Blue Marlin", 40).await?;
    for route in ROUTES {
        seed_route(&pool, tenant_id, boat_id, route).await?;
    }
    let user_id = ensure_user(&pool, "traveller@example.com", "Demo Traveller").await?;

    println!("Seed completed. Tenant ID: {tenant_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_tenant(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO tenants (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?;

    println!("Ensured tenant {name}");
    Ok(id)
}

async fn ensure_boat(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    name: &str,
    capacity: i32,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM boats WHERE tenant_id = $1 AND name = $2")
            .bind(tenant_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO boats (id, tenant_id, name, capacity) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(tenant_id)
        .bind(name)
        .bind(capacity)
        .execute(pool)
        .await?;

    println!("Ensured boat {name} (capacity={capacity})");
    Ok(id)
}

async fn seed_route(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    boat_id: Uuid,
    route: &Route,
) -> anyhow::Result<()> {
    let (product_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO products (id, tenant_id, name, location)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE SET location = EXCLUDED.location
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(route.product)
    .bind(route.location)
    .fetch_one(pool)
    .await?;

    // Capacity is left to the boat so ledgers pick up its seat count.
    sqlx::query(
        r#"
        INSERT INTO schedules (id, product_id, boat_id, departure_port, arrival_port,
                               departure_time, arrival_time, price_idr)
        SELECT $1, $2, $3, $4, $5, $6, $7, $8
        WHERE NOT EXISTS (
            SELECT 1 FROM schedules
            WHERE product_id = $2 AND departure_time = $6
        )
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(boat_id)
    .bind(route.departure_port)
    .bind(route.arrival_port)
    .bind(route.departure_time)
    .bind(route.arrival_time)
    .bind(route.price_idr)
    .execute(pool)
    .await?;

    println!("Seeded route {} -> {}", route.departure_port, route.arrival_port);
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, full_name: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, full_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(full_name)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email}");
    Ok(id)
}
