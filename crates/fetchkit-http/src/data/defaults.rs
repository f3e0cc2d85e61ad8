use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::options::{IpVersion, RequestOptions};
use crate::error::Result;

static GLOBAL: Lazy<RwLock<ClientDefaults>> = Lazy::new(|| RwLock::new(ClientDefaults::default()));

/// Baseline options every client starts from.
///
/// A client reads these once, at construction. Pass a value explicitly with
/// [`HttpClient::with_defaults`](crate::HttpClient::with_defaults) or rely on
/// the process-wide value managed by [`ClientDefaults::set_global`].
///
/// # Examples
///
/// ```toml
/// http_errors = false
/// ip_version = "v4"
/// timeout = 10.0
///
/// [headers]
/// X-Client = ["fetchkit"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientDefaults {
    pub headers: BTreeMap<String, Vec<String>>,

    /// Turn 4xx/5xx responses into [`Error::Request`](crate::Error::Request)
    /// directly from `send`. Off by default.
    pub http_errors: bool,

    pub ip_version: IpVersion,

    /// Total request timeout in seconds.
    pub timeout: Option<f64>,

    /// Connect timeout in seconds.
    pub connect_timeout: Option<f64>,

    pub verify: bool,

    pub user_agent: Option<String>,

    pub proxy: Option<String>,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            http_errors: false,
            ip_version: IpVersion::Any,
            timeout: None,
            connect_timeout: None,
            verify: true,
            user_agent: Some(format!("fetchkit/{}", env!("CARGO_PKG_VERSION"))),
            proxy: None,
        }
    }
}

fn seconds(value: Option<f64>) -> Option<Duration> { value.and_then(|s| Duration::try_from_secs_f64(s).ok()) }

impl ClientDefaults {
    /// Layer built-in defaults, the TOML file at `path` (if present) and
    /// `FETCHKIT_*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let defaults: ClientDefaults = Figment::from(Serialized::defaults(ClientDefaults::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FETCHKIT_"))
            .extract()
            .map_err(Box::new)?;
        Ok(defaults)
    }

    /// Snapshot of the process-wide defaults.
    pub fn global() -> ClientDefaults {
        GLOBAL.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the process-wide defaults. Clients that already exist keep
    /// the snapshot they were built with.
    pub fn set_global(defaults: ClientDefaults) {
        *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = defaults;
    }

    pub fn update_global(update: impl FnOnce(&mut ClientDefaults)) {
        update(&mut GLOBAL.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn to_options(&self) -> RequestOptions {
        let mut options = RequestOptions::new();
        for (name, values) in &self.headers {
            for value in values {
                options.headers.append(name.clone(), value.clone());
            }
        }
        if let Some(agent) = &self.user_agent {
            if !options.headers.contains("user-agent") {
                options.headers.append("User-Agent", agent.clone());
            }
        }
        options.http_errors = Some(self.http_errors);
        options.ip_version = Some(self.ip_version);
        options.verify = Some(self.verify);
        options.timeout = seconds(self.timeout);
        options.connect_timeout = seconds(self.connect_timeout);
        options.proxy = self.proxy.clone();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_options() {
        let options = ClientDefaults::default().to_options();
        assert_eq!(options.http_errors, Some(false));
        assert_eq!(options.verify, Some(true));
        assert_eq!(options.ip_version, Some(IpVersion::Any));
        assert!(options.headers.get_line("user-agent").unwrap().starts_with("fetchkit/"));
        assert!(options.timeout.is_none());
    }

    #[test]
    fn test_explicit_user_agent_header_wins() {
        let mut defaults = ClientDefaults::default();
        defaults.headers.insert("User-Agent".into(), vec!["custom/1".into()]);
        let options = defaults.to_options();
        assert_eq!(options.headers.get("user-agent").unwrap(), ["custom/1"]);
    }

    #[test]
    fn test_negative_timeout_is_ignored() {
        let defaults = ClientDefaults {
            timeout: Some(-1.0),
            connect_timeout: Some(1.5),
            ..Default::default()
        };
        let options = defaults.to_options();
        assert!(options.timeout.is_none());
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fetchkit.toml");
        std::fs::write(
            &path,
            "http_errors = true\nip_version = \"v6\"\ntimeout = 2.0\n\n[headers]\nX-Client = [\"a\", \"b\"]\n",
        )
        .unwrap();

        let defaults = ClientDefaults::load(&path).unwrap();
        assert!(defaults.http_errors);
        assert_eq!(defaults.ip_version, IpVersion::V6);
        assert_eq!(defaults.timeout, Some(2.0));
        assert_eq!(defaults.headers["X-Client"], vec!["a", "b"]);
        assert!(defaults.verify);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let defaults = ClientDefaults::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(defaults.http_errors, ClientDefaults::default().http_errors);
    }
}
