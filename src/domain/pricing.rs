//! Fare, total and contact helpers used when a booking is assembled.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::status::AgeCategory;

/// Unit price for one passenger on one leg.
///
/// Child and infant fares are `round(base * (100 - discount) / 100)`; with the
/// default 25% discount a 200000 fare becomes 150000. `None` when the fare
/// does not fit an `i64`.
pub fn unit_price(base_price: i64, category: AgeCategory, discount_percent: i64) -> Option<i64> {
    if !category.is_discounted() || base_price <= 0 {
        return Some(base_price.max(0));
    }
    let factor = 100 - discount_percent.clamp(0, 100);
    // half-up rounding on non-negative integers
    Some(base_price.checked_mul(factor)?.checked_add(50)? / 100)
}

/// Amount charged for the booking: a positive caller-supplied total wins,
/// otherwise the item subtotals plus the port fee. `None` on overflow.
pub fn booking_total(subtotals: &[i64], port_fee: i64, caller_total: Option<i64>) -> Option<i64> {
    match caller_total {
        Some(total) if total > 0 => Some(total),
        _ => subtotals
            .iter()
            .try_fold(0i64, |sum, subtotal| sum.checked_add(*subtotal))?
            .checked_add(port_fee.max(0)),
    }
}

/// Combine a country code and a local number into E.164 (`+62812...`).
///
/// A local number that repeats the country code, or starts with trunk zeros,
/// is trimmed. Returns an empty string when no plausible number results.
pub fn normalize_phone(country_code: Option<&str>, local: Option<&str>) -> String {
    let cc: String = country_code
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let mut number: String = local
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    if cc.is_empty() || number.is_empty() {
        return String::new();
    }

    let raw_local = local.unwrap_or_default().trim_start();
    let explicit_international = raw_local.starts_with('+') || raw_local.starts_with("00");
    if let Some(stripped) = number.strip_prefix("00") {
        number = stripped.to_string();
    }
    if (explicit_international || number.len() > 9) && number.starts_with(&cc) {
        number = number[cc.len()..].to_string();
    }
    let number = number.trim_start_matches('0');

    let total = cc.len() + number.len();
    if number.is_empty() || !(8..=15).contains(&total) {
        return String::new();
    }
    format!("+{cc}{number}")
}

/// Human readable code: `FB` + six random characters + UTC timestamp.
pub fn generate_booking_code(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("FB{}{}", &random[..6], now.format("%y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_and_infant_fares_are_discounted() {
        assert_eq!(unit_price(200_000, AgeCategory::Child, 25), Some(150_000));
        assert_eq!(unit_price(200_000, AgeCategory::Infant, 25), Some(150_000));
        assert_eq!(unit_price(200_000, AgeCategory::Adult, 25), Some(200_000));
        assert_eq!(unit_price(100_001, AgeCategory::Child, 25), Some(75_001));
        assert_eq!(unit_price(0, AgeCategory::Child, 25), Some(0));
    }

    #[test]
    fn oversized_fares_overflow_to_none() {
        assert_eq!(unit_price(i64::MAX, AgeCategory::Child, 25), None);
        assert_eq!(unit_price(i64::MAX, AgeCategory::Adult, 25), Some(i64::MAX));
        assert_eq!(booking_total(&[i64::MAX, 1], 0, None), None);
        assert_eq!(booking_total(&[i64::MAX - 1], 5, None), None);
    }

    #[test]
    fn round_trip_party_total_includes_port_fee() {
        // outbound 100000, inbound 120000; one adult, one child
        let fares: Vec<i64> = [
            unit_price(100_000, AgeCategory::Adult, 25),
            unit_price(100_000, AgeCategory::Child, 25),
            unit_price(120_000, AgeCategory::Adult, 25),
            unit_price(120_000, AgeCategory::Child, 25),
        ]
        .into_iter()
        .flatten()
        .collect();
        assert_eq!(fares, [100_000, 75_000, 120_000, 90_000]);
        assert_eq!(booking_total(&fares, 10_000, None), Some(395_000));
        assert_eq!(booking_total(&fares, 10_000, Some(0)), Some(395_000));
        assert_eq!(booking_total(&fares, 10_000, Some(500_000)), Some(500_000));
    }

    #[test]
    fn phone_numbers_are_normalized_to_e164() {
        assert_eq!(normalize_phone(Some("+62"), Some("0812-3456-789")), "+628123456789");
        assert_eq!(normalize_phone(Some("62"), Some("+62 812 3456 789")), "+628123456789");
        assert_eq!(normalize_phone(Some("+62"), Some("628123456789")), "+628123456789");
        assert_eq!(normalize_phone(Some("+1"), Some("(415) 555-0100")), "+14155550100");
        assert_eq!(normalize_phone(Some("+62"), Some("")), "");
        assert_eq!(normalize_phone(None, Some("08123456789")), "");
        assert_eq!(normalize_phone(Some("+62"), Some("000")), "");
    }

    #[test]
    fn booking_code_carries_prefix_and_timestamp() {
        let now = DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        let code = generate_booking_code(now);
        assert!(code.starts_with("FB"));
        assert!(code.ends_with("260304050607"));
        assert_eq!(code.len(), 2 + 6 + 12);
        assert_ne!(code, generate_booking_code(now));
    }
}
