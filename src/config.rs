use std::env;

use chrono::{Duration, FixedOffset, Offset, Utc};

/// Credentials for the secondary Supabase REST store.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub url: String,
    pub service_key: String,
    pub max_attempts: i32,
    pub interval_secs: u64,
}

/// Business policies shared by the booking components.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Time a PENDING booking has to be paid before it expires.
    pub payment_window: Duration,
    /// Percentage taken off the base fare for child and infant passengers.
    pub child_discount_percent: i64,
    /// Bookings are refused for departures closer than this.
    pub booking_cutoff: Duration,
    /// Offset of the timezone schedule times are expressed in (Bali is UTC+8).
    pub utc_offset_hours: i32,
    /// Largest party one booking may carry.
    pub max_passengers: usize,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            payment_window: Duration::minutes(15),
            child_discount_percent: 25,
            booking_cutoff: Duration::minutes(20),
            utc_offset_hours: 8,
            max_passengers: 50,
        }
    }
}

impl BookingPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            payment_window: env_parse::<i64>("PAYMENT_WINDOW_MINUTES")
                .map(Duration::minutes)
                .unwrap_or(defaults.payment_window),
            child_discount_percent: env_parse::<i64>("CHILD_DISCOUNT_PERCENT")
                .map(|p| p.clamp(0, 100))
                .unwrap_or(defaults.child_discount_percent),
            booking_cutoff: env_parse::<i64>("BOOKING_CUTOFF_MINUTES")
                .map(Duration::minutes)
                .unwrap_or(defaults.booking_cutoff),
            utc_offset_hours: env_parse::<i32>("SERVICE_UTC_OFFSET_HOURS")
                .filter(|h| (-12..=14).contains(h))
                .unwrap_or(defaults.utc_offset_hours),
            max_passengers: env_parse::<usize>("MAX_PASSENGERS_PER_BOOKING")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_passengers),
        }
    }

    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or(Utc.fix())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub app_env: String,
    pub jwt_secret: String,
    pub allow_payment_simulation: bool,
    pub sweep_interval_secs: u64,
    pub mirror: Option<MirrorConfig>,
    pub policy: BookingPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| anyhow::anyhow!("SUPABASE_JWT_SECRET is not set"))?;
        let allow_payment_simulation = env_flag("ALLOW_PAYMENT_SIMULATION");
        let sweep_interval_secs = env_parse::<u64>("SWEEP_INTERVAL_SECS").unwrap_or(60);

        let mirror = match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Ok(url), Ok(service_key)) if !url.is_empty() && !service_key.is_empty() => {
                Some(MirrorConfig {
                    url: url.trim_end_matches('/').to_string(),
                    service_key,
                    max_attempts: env_parse::<i32>("MIRROR_MAX_ATTEMPTS").unwrap_or(8),
                    interval_secs: env_parse::<u64>("MIRROR_INTERVAL_SECS").unwrap_or(15),
                })
            }
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            host,
            app_env,
            jwt_secret,
            allow_payment_simulation,
            sweep_interval_secs,
            mirror,
            policy: BookingPolicy::from_env(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Simulated payments skip the ownership check, so they are only honoured
    /// outside production unless explicitly switched on.
    pub fn simulation_enabled(&self) -> bool {
        !self.is_production() || self.allow_payment_simulation
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
