use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub tls: bool,
}

/// Which origins the CORS layer lets through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsMode {
    Any,
    AllowList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub admin_email: Option<String>,
    pub admin_code: String,
    pub app_url: Option<String>,
    /// `None` when the relay is not fully configured; mail is then skipped.
    pub smtp: Option<SmtpConfig>,
    pub cors: CorsMode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: optional("JWT_ISSUER").unwrap_or_else(|| "authgate".into()),
            audience: optional("JWT_AUDIENCE").unwrap_or_else(|| "authgate-users".into()),
            ttl_days: parsed("JWT_TTL_DAYS")?.unwrap_or(7),
        };

        let port = match parsed("PORT")? {
            Some(p) => p,
            None => parsed("APP_PORT")?.unwrap_or(8080),
        };

        Ok(Self {
            host: optional("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            jwt,
            admin_email: optional("ADMIN_EMAIL"),
            admin_code: required("ADMIN_CODE")?,
            app_url: optional("APP_URL").map(|u| u.trim_end_matches('/').to_string()),
            smtp: smtp_from_env()?,
            cors: cors_mode(optional("CORS_ORIGINS").as_deref()),
        })
    }
}

fn smtp_from_env() -> Result<Option<SmtpConfig>, ConfigError> {
    let (Some(host), Some(from)) = (optional("SMTP_HOST"), optional("SMTP_FROM")) else {
        return Ok(None);
    };
    Ok(Some(SmtpConfig {
        host,
        port: parsed("SMTP_PORT")?.unwrap_or(587),
        username: optional("SMTP_USERNAME"),
        password: optional("SMTP_PASSWORD"),
        from,
        tls: parsed("SMTP_TLS")?.unwrap_or(true),
    }))
}

pub(crate) fn cors_mode(raw: Option<&str>) -> CorsMode {
    let origins: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsMode::Any
    } else {
        CorsMode::AllowList(origins)
    }
}

/// Unset and blank values are treated the same.
fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}
