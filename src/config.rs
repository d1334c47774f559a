use chrono::Duration;
use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_TOKEN_LIFETIME_DAYS: i64 = 7;
const DEFAULT_BCRYPT_COST: u32 = 12;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Shipping rules applied when a cart is turned into an order.
#[derive(Debug, Clone, Copy)]
pub struct PricingConfig {
    /// Subtotals strictly above this ship for free.
    pub free_shipping_threshold: i64,
    pub shipping_fee: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            free_shipping_threshold: 500_000,
            shipping_fee: 50_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongo_uri: String,
    pub database_name: String,
    pub store_backend: StoreBackend,
    pub jwt_secret: String,
    pub token_lifetime: Duration,
    pub bcrypt_cost: u32,
    pub pricing: PricingConfig,
    pub cors_origin: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    /// Defaults for everything except the signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            database_name: "miropet".to_string(),
            store_backend: StoreBackend::Mongo,
            jwt_secret: jwt_secret.into(),
            token_lifetime: Duration::days(DEFAULT_TOKEN_LIFETIME_DAYS),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            pricing: PricingConfig::default(),
            cors_origin: None,
            admin_email: None,
            admin_password: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let mut config = AppConfig::with_secret(jwt_secret);

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Some(port) = parsed_var("PORT")? {
            config.port = port;
        }
        if let Ok(uri) = env::var("MONGODB_URI") {
            config.mongo_uri = uri;
        }
        if let Ok(name) = env::var("DATABASE_NAME") {
            config.database_name = name;
        }
        if let Ok(backend) = env::var("STORE_BACKEND") {
            config.store_backend = backend.parse().map_err(|_| ConfigError::Invalid {
                name: "STORE_BACKEND",
                value: backend.clone(),
            })?;
        }
        if let Ok(expires_in) = env::var("JWT_EXPIRES_IN") {
            config.token_lifetime =
                parse_lifetime(&expires_in).ok_or_else(|| ConfigError::Invalid {
                    name: "JWT_EXPIRES_IN",
                    value: expires_in.clone(),
                })?;
        }
        if let Some(cost) = parsed_var("BCRYPT_COST")? {
            config.bcrypt_cost = cost;
        }
        if let Some(threshold) = parsed_var("FREE_SHIPPING_THRESHOLD")? {
            config.pricing.free_shipping_threshold = threshold;
        }
        if let Some(fee) = parsed_var("SHIPPING_FEE")? {
            config.pricing.shipping_fee = fee;
        }
        config.cors_origin = env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty());
        config.admin_email = env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty());
        config.admin_password = env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty());

        Ok(config)
    }
}

fn parsed_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Parses token lifetimes such as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_lifetime(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c.to_ascii_lowercase())),
        _ => (raw, None),
    };
    let amount: i64 = digits.trim().parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        None | Some('s') => Some(Duration::seconds(amount)),
        Some('m') => Some(Duration::minutes(amount)),
        Some('h') => Some(Duration::hours(amount)),
        Some('d') => Some(Duration::days(amount)),
        Some(_) => None,
    }
}
