//! Deterministic cache key construction.
//!
//! Keys are `<category>:<discriminators...>`. Symbol lists are normalized
//! (trimmed, case-folded, deduplicated, sorted) so that the same request
//! asked in a different order lands on the same entry.

use chrono::NaiveDate;

use super::category::CacheCategory;

/// Placeholder for an empty symbol list.
const DEFAULT_SYMBOLS: &str = "default";

/// Normalize currency codes: upper-case, sorted, unique.
pub fn normalize_currencies<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    normalize(symbols, |s| s.to_ascii_uppercase())
}

/// Normalize provider coin ids: lower-case, sorted, unique.
pub fn normalize_coin_ids<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    normalize(ids, |s| s.to_ascii_lowercase())
}

fn normalize<S: AsRef<str>>(symbols: &[S], fold: impl Fn(&str) -> String) -> Vec<String> {
    let mut out: Vec<String> = symbols
        .iter()
        .map(|s| fold(s.as_ref().trim()))
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn joined(normalized: &[String]) -> String {
    if normalized.is_empty() {
        DEFAULT_SYMBOLS.to_string()
    } else {
        normalized.join(",")
    }
}

pub fn forex_latest(base: &str, symbols: &[String]) -> String {
    format!(
        "{}:{}:{}",
        CacheCategory::ForexLatest,
        base.trim().to_ascii_uppercase(),
        joined(&normalize_currencies(symbols))
    )
}

pub fn forex_historical(date: NaiveDate, base: &str, symbols: &[String]) -> String {
    format!(
        "{}:{}:{}:{}",
        CacheCategory::ForexHistorical,
        date.format("%Y-%m-%d"),
        base.trim().to_ascii_uppercase(),
        joined(&normalize_currencies(symbols))
    )
}

pub fn crypto_latest(ids: &[String]) -> String {
    format!("{}:{}", CacheCategory::CryptoLatest, joined(&normalize_coin_ids(ids)))
}

pub fn crypto_historical(date: NaiveDate, ids: &[String]) -> String {
    format!(
        "{}:{}:{}",
        CacheCategory::CryptoHistorical,
        date.format("%Y-%m-%d"),
        joined(&normalize_coin_ids(ids))
    )
}

pub fn crypto_marketcap(ids: &[String]) -> String {
    format!("{}:{}", CacheCategory::CryptoMarketCap, joined(&normalize_coin_ids(ids)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_symbol_order_does_not_change_key() {
        let a = forex_latest("usd", &strings(&["GBP", "eur", "JPY"]));
        let b = forex_latest("USD", &strings(&[" jpy", "EUR", "GBP", "EUR"]));
        assert_eq!(a, b);
        assert_eq!(a, "forex:latest:USD:EUR,GBP,JPY");
    }

    #[test]
    fn test_distinct_parameters_give_distinct_keys() {
        let eur = forex_latest("USD", &strings(&["EUR"]));
        let gbp = forex_latest("USD", &strings(&["GBP"]));
        let base = forex_latest("EUR", &strings(&["EUR"]));
        assert_ne!(eur, gbp);
        assert_ne!(eur, base);
    }

    #[test]
    fn test_empty_symbols_use_default() {
        assert_eq!(forex_latest("USD", &[]), "forex:latest:USD:default");
        assert_eq!(crypto_latest(&strings(&["", " "])), "crypto:latest:default");
    }

    #[test]
    fn test_dated_keys() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            forex_historical(date, "usd", &strings(&["EUR"])),
            "forex:historical:2024-01-02:USD:EUR"
        );
        assert_eq!(
            crypto_historical(date, &strings(&["Solana", "bitcoin"])),
            "crypto:historical:2024-01-02:bitcoin,solana"
        );
    }

    #[test]
    fn test_marketcap_key() {
        assert_eq!(
            crypto_marketcap(&strings(&["ethereum", "bitcoin"])),
            "crypto:marketcap:bitcoin,ethereum"
        );
    }
}
