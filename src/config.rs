use crate::conn::ConnectionOptions;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_SEC: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ldap://host[:port] or ldaps://host[:port]
    pub url: String,
    /// TCP connect (and ldaps handshake) timeout in seconds (default 5).
    pub connect_timeout_sec: Option<u64>,
    /// Per-response timeout in milliseconds. 0 or unset means one hour.
    pub read_timeout_ms: Option<u64>,
    /// Send an Abandon for requests that time out (default false).
    pub abandon_on_timeout: Option<bool>,
    pub tls: Option<TlsConfig>,
    pub bind: Option<BindConfig>,
    /// Page size used by the CLI for paged searches.
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Issue StartTLS right after connecting (ignored for ldaps://).
    pub starttls: Option<bool>,
    /// PEM CA certificate or bundle, used in addition to system roots.
    pub ca_file: Option<String>,
    /// Do not verify the server certificate (test setups only).
    pub skip_verify: Option<bool>,
    /// Name to verify the certificate against when it differs from the URL host.
    pub server_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    pub binddn: Option<String>,
    pub credentials: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_sec.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SEC))
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        let defaults = ConnectionOptions::default();
        ConnectionOptions {
            read_timeout: match self.read_timeout_ms {
                Some(ms) if ms > 0 => Duration::from_millis(ms),
                _ => defaults.read_timeout,
            },
            abandon_on_timeout: self.abandon_on_timeout.unwrap_or(defaults.abandon_on_timeout),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "ldap://127.0.0.1:389".to_string(),
            connect_timeout_sec: Some(DEFAULT_CONNECT_TIMEOUT_SEC),
            read_timeout_ms: None,
            abandon_on_timeout: Some(false),
            tls: None,
            bind: None,
            page_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::DEFAULT_TIMEOUT;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.url, "ldap://127.0.0.1:389");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection_options(), ConnectionOptions::default());
        assert!(config.bind.is_none());
    }

    #[test]
    fn test_config_from_str() {
        let yaml = r#"
url: "ldap://ldap.example.com:389"
connect_timeout_sec: 3
read_timeout_ms: 1500
abandon_on_timeout: true
tls:
  starttls: true
  ca_file: "/etc/ssl/ca.pem"
bind:
  binddn: "cn=admin,dc=example,dc=com"
  credentials: "password"
page_size: 200
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.url, "ldap://ldap.example.com:389");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        let options = config.connection_options();
        assert_eq!(options.read_timeout, Duration::from_millis(1500));
        assert!(options.abandon_on_timeout);
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.starttls, Some(true));
        assert_eq!(tls.ca_file, Some("/etc/ssl/ca.pem".to_string()));
        assert_eq!(tls.skip_verify, None);
        let bind = config.bind.as_ref().unwrap();
        assert_eq!(bind.binddn, Some("cn=admin,dc=example,dc=com".to_string()));
        assert_eq!(bind.credentials, Some("password".to_string()));
        assert_eq!(config.page_size, Some(200));
    }

    #[test]
    fn test_config_from_str_minimal() {
        let config = Config::from_str("url: \"ldaps://ldap.example.com\"\n").unwrap();
        assert_eq!(config.url, "ldaps://ldap.example.com");
        assert!(config.tls.is_none());
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_read_timeout_means_default() {
        let config = Config::from_str("url: \"ldap://localhost\"\nread_timeout_ms: 0\n").unwrap();
        assert_eq!(config.connection_options().read_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_config_from_file() {
        let yaml = r#"
url: "ldap://127.0.0.1:1389"
bind:
  binddn: "cn=reader,dc=example,dc=com"
  credentials: "secret"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.url, "ldap://127.0.0.1:1389");
        assert_eq!(
            config.bind.unwrap().binddn,
            Some("cn=reader,dc=example,dc=com".to_string())
        );
    }

    #[test]
    fn test_config_from_str_invalid_yaml() {
        let yaml = "invalid: yaml: content: [";
        assert!(Config::from_str(yaml).is_err());
    }

    #[test]
    fn test_config_missing_url() {
        assert!(Config::from_str("page_size: 10\n").is_err());
    }

    #[test]
    fn test_config_from_file_nonexistent() {
        assert!(Config::from_file("/nonexistent/path/config.yaml").is_err());
    }
}
