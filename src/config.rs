//! Session and run configuration.
//!
//! Loaded from `S3_DUMP_*` environment variables merged with an optional TOML
//! file; the file wins on conflicts. Nested keys in the environment use `__`,
//! e.g. `S3_DUMP_SESSION__NAME=engagement-1`.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tracing::info;

pub const ENV_PREFIX: &str = "S3_DUMP_";
pub const DEFAULT_CONFIG_FILE: &str = "s3_dump.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub session: Session,

    /// Base directory for everything the run writes.
    #[serde(default = "default_download_root")]
    pub download_root: PathBuf,

    #[serde(default)]
    pub proxy: Option<ProxyEndpoint>,
}

fn default_download_root() -> PathBuf {
    PathBuf::from("sessions")
}

/// The credentials the run acts as. Any credential left unset falls back to
/// the SDK's default provider chain.
#[derive(Clone, Deserialize)]
pub struct Session {
    #[serde(default = "default_session_name")]
    pub name: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub region: Option<String>,
    /// Endpoint override, e.g. a local S3-compatible server.
    pub endpoint: Option<String>,
}

fn default_session_name() -> String {
    "default".to_string()
}

impl Default for Session {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            region: None,
            endpoint: None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("session_token", &redacted(&self.session_token))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Local SOCKS5 proxy all S3 calls are routed through.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProxyEndpoint {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

fn default_proxy_host() -> String {
    "127.0.0.1".to_string()
}

fn default_proxy_port() -> u16 {
    8001
}

impl ProxyEndpoint {
    pub fn url(&self) -> String {
        format!("socks5://{}:{}", self.host, self.port)
    }
}

/// Load settings from the environment, layering `config_file` on top if given.
///
/// A `config_file` that does not exist is an error rather than an empty layer.
pub fn load_settings(config_file: Option<&Path>) -> anyhow::Result<Settings> {
    info!(config_file = ?config_file, "loading configuration");

    let figment = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    let figment = match config_file {
        Some(path) => {
            let exists = path
                .try_exists()
                .with_context(|| format!("Could not check for {}", path.display()))?;
            anyhow::ensure!(exists, "Configuration file {} does not exist", path.display());
            figment.merge(Toml::file(path))
        }
        None => figment,
    };

    let context = match config_file {
        Some(path) => format!(
            "Failed to parse configuration from {} and {}* environment variables",
            path.display(),
            ENV_PREFIX
        ),
        None => format!("Failed to parse configuration from {ENV_PREFIX}* environment variables"),
    };

    figment.extract().context(context)
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    fn load(path: &str) -> figment::Result<Settings> {
        load_settings(Some(Path::new(path))).map_err(|e| format!("{e:#}").into())
    }

    #[test]
    fn full_config_parses() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                download_root = "/tmp/dumps"

                [session]
                name = "engagement"
                access_key_id = "AKIAEXAMPLE"
                secret_access_key = "shh"
                session_token = "tok"
                region = "eu-west-1"

                [proxy]
                port = 9050
                "#,
            )?;

            let settings = load(DEFAULT_CONFIG_FILE)?;
            assert_eq!(settings.download_root, PathBuf::from("/tmp/dumps"));
            assert_eq!(settings.session.name, "engagement");
            assert_eq!(settings.session.access_key_id.as_deref(), Some("AKIAEXAMPLE"));
            assert_eq!(settings.session.region.as_deref(), Some("eu-west-1"));
            assert!(settings.session.endpoint.is_none());

            let proxy = settings.proxy.unwrap();
            assert_eq!(proxy.host, "127.0.0.1");
            assert_eq!(proxy.url(), "socks5://127.0.0.1:9050");
            Ok(())
        });
    }

    #[test]
    fn empty_config_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(DEFAULT_CONFIG_FILE, "")?;

            let settings = load(DEFAULT_CONFIG_FILE)?;
            assert_eq!(settings.download_root, PathBuf::from("sessions"));
            assert_eq!(settings.session.name, "default");
            assert!(settings.session.access_key_id.is_none());
            assert!(settings.proxy.is_none());
            Ok(())
        });
    }

    #[test]
    fn environment_fills_gaps_and_file_wins() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("S3_DUMP_SESSION__NAME", "from-env");
            jail.set_env("S3_DUMP_SESSION__REGION", "us-east-2");
            jail.set_env("S3_DUMP_DOWNLOAD_ROOT", "/env/root");
            jail.create_file(DEFAULT_CONFIG_FILE, "[session]\nregion = \"eu-north-1\"\n")?;

            let settings = load(DEFAULT_CONFIG_FILE)?;
            assert_eq!(settings.session.name, "from-env");
            assert_eq!(settings.session.region.as_deref(), Some("eu-north-1"));
            assert_eq!(settings.download_root, PathBuf::from("/env/root"));

            let settings = load_settings(None).map_err(|e| e.to_string())?;
            assert_eq!(settings.session.region.as_deref(), Some("us-east-2"));
            Ok(())
        });
    }

    #[test]
    fn missing_config_file_is_an_error() {
        Jail::expect_with(|jail| {
            jail.clear_env();

            let err = load("not-here.toml").unwrap_err();
            assert!(err.to_string().contains("not-here.toml"));
            assert!(err.to_string().contains("does not exist"));
            Ok(())
        });
    }

    #[test]
    fn debug_redacts_secrets() {
        let session = Session {
            secret_access_key: Some("very-secret".into()),
            session_token: Some("also-secret".into()),
            ..Session::default()
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("also-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn malformed_config_reports_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(DEFAULT_CONFIG_FILE, "[proxy]\nport = \"not a port\"\n")?;

            let err = load(DEFAULT_CONFIG_FILE).unwrap_err();
            assert!(err.to_string().contains(DEFAULT_CONFIG_FILE));
            Ok(())
        });
    }
}
