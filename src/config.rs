use std::path::PathBuf;
use std::time::Duration;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaBackend {
    Fs,
    S3,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub media_backend: MediaBackend,
    pub media_root: PathBuf,
    pub s3: S3Config,
    pub index_cache_ttl: Duration,
    pub bootstrap_admins: Vec<String>,
    pub enable_hsts: bool,
    pub frontend_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source (tests pass a map).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = non_empty("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} characters"),
            });
        }

        let media_backend = match non_empty("MEDIA_BACKEND").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("fs") => MediaBackend::Fs,
            Some("s3") => MediaBackend::S3,
            Some(other) => {
                return Err(ConfigError::Invalid { name: "MEDIA_BACKEND", reason: format!("unknown backend '{other}'") })
            }
        };

        let index_cache_ttl = match non_empty("INDEX_CACHE_TTL_SECS") {
            None => Duration::from_secs(20),
            Some(v) => Duration::from_secs(v.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "INDEX_CACHE_TTL_SECS",
                reason: format!("{e}"),
            })?),
        };

        let bootstrap_admins = non_empty("BOOTSTRAP_ADMIN_USERNAMES")
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            jwt_secret,
            database_url: non_empty("DATABASE_URL"),
            data_dir: non_empty("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            media_backend,
            media_root: non_empty("MEDIA_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("media")),
            s3: S3Config {
                bucket: non_empty("S3_BUCKET").unwrap_or_else(|| "yatube-media".into()),
                endpoint: non_empty("S3_ENDPOINT"),
                region: non_empty("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                access_key: non_empty("S3_ACCESS_KEY"),
                secret_key: non_empty("S3_SECRET_KEY"),
            },
            index_cache_ttl,
            bootstrap_admins,
            enable_hsts: non_empty("ENABLE_HSTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            frontend_url: non_empty("FRONTEND_URL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.media_backend, MediaBackend::Fs);
        assert_eq!(cfg.index_cache_ttl, Duration::from_secs(20));
        assert!(cfg.bootstrap_admins.is_empty());
        assert!(!cfg.enable_hsts);
    }

    #[test]
    fn secret_is_required_and_long() {
        assert!(matches!(AppConfig::from_lookup(lookup(&[])), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("JWT_SECRET", "short")])),
            Err(ConfigError::Invalid { name: "JWT_SECRET", .. })
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", SECRET),
            ("MEDIA_BACKEND", "S3"),
            ("INDEX_CACHE_TTL_SECS", "5"),
            ("BOOTSTRAP_ADMIN_USERNAMES", "root, ops ,"),
            ("ENABLE_HSTS", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.media_backend, MediaBackend::S3);
        assert_eq!(cfg.index_cache_ttl, Duration::from_secs(5));
        assert_eq!(cfg.bootstrap_admins, ["root", "ops"]);
        assert!(cfg.enable_hsts);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET), ("MEDIA_BACKEND", "ftp")])).unwrap_err();
        assert!(err.to_string().contains("MEDIA_BACKEND"));
        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET), ("INDEX_CACHE_TTL_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("INDEX_CACHE_TTL_SECS"));
    }
}
