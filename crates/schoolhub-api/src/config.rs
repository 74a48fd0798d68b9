use std::path::PathBuf;

use anyhow::Context;

/// Values shipped in `.env.example` files that must not count as configured.
const PLACEHOLDER_VALUES: &[&str] = &[
    "your-backend-url",
    "your-anon-key",
    "your-jwt-secret",
    "https://your-project.example.com",
    "placeholder",
    "change-me",
    "dev-secret-change-me",
];

/// Connection details for the hosted identity backend.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub jwt_secret: Option<String>,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|v| !is_placeholder(v));
        Self {
            url: read("SCHOOLHUB_BACKEND_URL").filter(|u| u.starts_with("http://") || u.starts_with("https://")),
            anon_key: read("SCHOOLHUB_ANON_KEY"),
            jwt_secret: read("SCHOOLHUB_JWT_SECRET"),
        }
    }

    /// All three values present and real. Otherwise only public pages are served.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.anon_key.is_some() && self.jwt_secret.is_some()
    }
}

fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || PLACEHOLDER_VALUES.contains(&value)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cookie_secure: bool,
    pub backend: BackendConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("SCHOOLHUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("SCHOOLHUB_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("SCHOOLHUB_PORT must be a port number")?;
        let db_path = std::env::var("SCHOOLHUB_DB_PATH")
            .unwrap_or_else(|_| "schoolhub.db".into())
            .into();
        let cookie_secure = std::env::var("SCHOOLHUB_COOKIE_SECURE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            host,
            port,
            db_path,
            cookie_secure,
            backend: BackendConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> BackendConfig {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        BackendConfig::from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn complete_config_is_configured() {
        let cfg = config(&[
            ("SCHOOLHUB_BACKEND_URL", "https://abc.backend.io"),
            ("SCHOOLHUB_ANON_KEY", "anon-123"),
            ("SCHOOLHUB_JWT_SECRET", "s3cret"),
        ]);
        assert!(cfg.is_configured());
    }

    #[test]
    fn missing_values_degrade() {
        assert!(!config(&[]).is_configured());
        assert!(
            !config(&[
                ("SCHOOLHUB_BACKEND_URL", "https://abc.backend.io"),
                ("SCHOOLHUB_ANON_KEY", "anon-123"),
            ])
            .is_configured()
        );
    }

    #[test]
    fn placeholder_values_degrade() {
        let cfg = config(&[
            ("SCHOOLHUB_BACKEND_URL", "your-backend-url"),
            ("SCHOOLHUB_ANON_KEY", "your-anon-key"),
            ("SCHOOLHUB_JWT_SECRET", "s3cret"),
        ]);
        assert!(!cfg.is_configured());
        assert!(cfg.url.is_none());

        let not_a_url = config(&[
            ("SCHOOLHUB_BACKEND_URL", "abc.backend.io"),
            ("SCHOOLHUB_ANON_KEY", "anon-123"),
            ("SCHOOLHUB_JWT_SECRET", "  "),
        ]);
        assert!(not_a_url.url.is_none());
        assert!(not_a_url.jwt_secret.is_none());
    }
}
