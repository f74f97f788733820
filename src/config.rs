//! Service configuration, read from the environment (and `.env`).

use std::env;
use tracing::warn;

use crate::domain::aggregates::Address;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub easypost_api_key: Option<String>,
    pub easypost_test_mode: bool,
    pub frontend_url: String,
    pub discord_webhook_url: Option<String>,
    pub price_table_path: Option<String>,
    pub ship_from: Option<Address>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if get("DATABASE_URL").is_none() && get("SUPABASE_URL").is_some() {
            warn!("SUPABASE_URL is set but DATABASE_URL is not; point DATABASE_URL at the Supabase Postgres connection string");
        }

        let port = get("PORT").and_then(|p| p.parse().ok()).unwrap_or(8083);
        let easypost_test_mode = get("EASYPOST_TEST_MODE").map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false);

        let ship_from = match (get("SHIP_FROM_STREET1"), get("SHIP_FROM_CITY"), get("SHIP_FROM_ZIP")) {
            (Some(street1), Some(city), Some(zip)) => Some(Address {
                name: get("SHIP_FROM_NAME").unwrap_or_else(|| "Shipping Department".to_string()),
                street1,
                city,
                zip,
                state: get("SHIP_FROM_STATE"),
                country: get("SHIP_FROM_COUNTRY").unwrap_or_else(|| "US".to_string()),
                phone: get("SHIP_FROM_PHONE"),
                ..Address::default()
            }),
            _ => None,
        };

        Self {
            port,
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            easypost_api_key: get("EASYPOST_API_KEY"),
            easypost_test_mode,
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string()).trim_end_matches('/').to_string(),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
            price_table_path: get("PRICE_TABLE_PATH"),
            ship_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 8083);
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert!(config.stripe_secret_key.is_none());
        assert!(config.ship_from.is_none());
        assert!(!config.easypost_test_mode);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "9000"), ("EASYPOST_TEST_MODE", "TRUE"), ("FRONTEND_URL", "https://shop.example.com/"),
            ("STRIPE_SECRET_KEY", "  "), ("SHIP_FROM_STREET1", "1 Main St"), ("SHIP_FROM_CITY", "Austin"),
            ("SHIP_FROM_ZIP", "78701"), ("SHIP_FROM_STATE", "TX"),
        ].into_iter().collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 9000);
        assert!(config.easypost_test_mode);
        assert_eq!(config.frontend_url, "https://shop.example.com");
        assert!(config.stripe_secret_key.is_none());
        let from = config.ship_from.unwrap();
        assert_eq!(from.city, "Austin");
        assert_eq!(from.country, "US");
    }
}
