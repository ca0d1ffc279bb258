//! Engine configuration.
//!
//! Configuration is immutable once handed to [`Engine::init`]; workers read
//! it without locking. A small `key=value` file loader covers the config file
//! format consumed by deployment tooling.
//!
//! [`Engine::init`]: crate::engine::Engine::init

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Option bit: refuse TLS 1.2, negotiate TLS 1.3 only.
pub const SSL_OPT_NO_TLS12: u64 = 1 << 0;

/// Option bit: refuse TLS 1.3, negotiate TLS 1.2 only.
pub const SSL_OPT_NO_TLS13: u64 = 1 << 1;

/// Verbosity of engine diagnostics, consumed by the embedding application
/// when it installs a `tracing` subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warning,
    /// Operational messages.
    Info,
    /// Per-request diagnostics.
    Debug,
}

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TCP port to listen on (1-65535).
    pub port: u16,
    /// Seconds a connection may stay idle before it is closed.
    pub conn_timeout_secs: u32,
    /// Cap on request-body bytes accepted per connection, in megabytes.
    pub max_data_per_conn_mb: u32,
    /// Number of worker threads draining the event queue.
    pub worker_count: usize,
    /// Maximum simultaneously open client connections.
    pub client_count: usize,
    /// TLS protocol-version option bits (`SSL_OPT_*`).
    pub ssl_options: u64,
    /// Serve TLS instead of plaintext.
    pub secure: bool,
    /// Route diagnostics to syslog instead of a file.
    pub use_syslog: bool,
    /// PEM certificate chain, required when `secure`.
    pub ssl_certificate: Option<PathBuf>,
    /// PEM private key, required when `secure`.
    pub ssl_key: Option<PathBuf>,
    /// Colon-separated cipher-suite allow list; empty means provider default.
    pub ssl_cipher_list: Option<String>,
    /// Destination file for debug diagnostics.
    pub debug_log_file: Option<PathBuf>,
    /// Name the embedding daemon reports in logs.
    pub daemon_name: String,
    /// Diagnostic verbosity.
    pub debug_log_level: LogLevel,
    /// Strip stray CR/LF bytes from `Content-Length` bodies before they are
    /// handed to the handler. Corrupts binary payloads; off by default.
    pub strip_body_crlf: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 81,
            conn_timeout_secs: 60,
            max_data_per_conn_mb: 25,
            worker_count: 5,
            client_count: 5,
            ssl_options: 0,
            secure: false,
            use_syslog: false,
            ssl_certificate: None,
            ssl_key: None,
            ssl_cipher_list: None,
            debug_log_file: None,
            daemon_name: "restd".to_owned(),
            debug_log_level: LogLevel::Info,
            strip_body_crlf: false,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a `key=value` file.
    ///
    /// Blank lines and `#` comments are skipped; unknown keys are logged and
    /// ignored so config files can carry application-specific entries.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|_| EngineError::InvalidParams("config file not readable"))?;

        let mut config = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(EngineError::InvalidParams("config line missing '='"))?;
            config.apply(key.trim(), value.trim())?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the rest of the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(EngineError::InvalidParams("port must be 1-65535"));
        }
        if self.worker_count == 0 {
            return Err(EngineError::InvalidParams("worker count must be nonzero"));
        }
        if self.client_count == 0 {
            return Err(EngineError::InvalidParams("client count must be nonzero"));
        }
        if self.conn_timeout_secs == 0 {
            return Err(EngineError::InvalidParams("connection timeout must be nonzero"));
        }
        if self.secure && (self.ssl_certificate.is_none() || self.ssl_key.is_none()) {
            return Err(EngineError::InvalidParams(
                "secure mode requires certificate and key paths",
            ));
        }
        if self.ssl_options & (SSL_OPT_NO_TLS12 | SSL_OPT_NO_TLS13)
            == (SSL_OPT_NO_TLS12 | SSL_OPT_NO_TLS13)
        {
            return Err(EngineError::InvalidParams(
                "ssl options exclude every supported protocol version",
            ));
        }
        Ok(())
    }

    /// Per-connection body cap in bytes.
    pub(crate) fn max_data_per_conn_bytes(&self) -> u64 {
        u64::from(self.max_data_per_conn_mb) * 1024 * 1024
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "port" => {
                self.port = value
                    .parse()
                    .map_err(|_| EngineError::InvalidParams("port"))?
            }
            "connTimeoutSec" => {
                self.conn_timeout_secs = value
                    .parse()
                    .map_err(|_| EngineError::InvalidParams("connTimeoutSec"))?
            }
            "maxDataPerConnMB" => {
                self.max_data_per_conn_mb = value
                    .parse()
                    .map_err(|_| EngineError::InvalidParams("maxDataPerConnMB"))?
            }
            "workerThrCnt" => {
                self.worker_count = value
                    .parse()
                    .map_err(|_| EngineError::InvalidParams("workerThrCnt"))?
            }
            "clientCnt" => {
                self.client_count = value
                    .parse()
                    .map_err(|_| EngineError::InvalidParams("clientCnt"))?
            }
            "isSecure" => self.secure = parse_bool(value)?,
            "useSysLog" => self.use_syslog = parse_bool(value)?,
            "stripBodyCrlf" => self.strip_body_crlf = parse_bool(value)?,
            "sslCertPath" => self.ssl_certificate = Some(PathBuf::from(value)),
            "sslKeyPath" => self.ssl_key = Some(PathBuf::from(value)),
            "sslCipherList" => self.ssl_cipher_list = Some(value.to_owned()),
            "debugLogFile" => self.debug_log_file = Some(PathBuf::from(value)),
            "daemonName" => self.daemon_name = value.to_owned(),
            "debugLogLevel" => {
                self.debug_log_level = match value.to_ascii_lowercase().as_str() {
                    "error" => LogLevel::Error,
                    "warning" | "warn" => LogLevel::Warning,
                    "info" => LogLevel::Info,
                    "debug" => LogLevel::Debug,
                    _ => return Err(EngineError::InvalidParams("debugLogLevel")),
                }
            }
            other => {
                tracing::warn!(key = other, "ignoring unknown config key");
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(EngineError::InvalidParams("boolean config value")),
    }
}

#[cfg(test)]
mod test {
    use super::{EngineConfig, LogLevel, SSL_OPT_NO_TLS12, SSL_OPT_NO_TLS13};
    use std::io::Write;

    fn write_temp_config(body: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "restive-config-test-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let mut file = std::fs::File::create(&path).expect("temp config");
        file.write_all(body.as_bytes()).expect("write temp config");
        path
    }

    #[test]
    fn defaults_pass_validation() {
        EngineConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn file_loader_parses_known_keys() {
        let path = write_temp_config(
            "# demo config\n\
             port=8080\n\
             workerThrCnt=3\n\
             clientCnt=7\n\
             connTimeoutSec=15\n\
             debugLogFile=/tmp/restive.log\n\
             debugLogLevel=debug\n",
        );
        let config = EngineConfig::from_file(&path).expect("config loads");
        std::fs::remove_file(&path).ok();

        assert_eq!(8080, config.port);
        assert_eq!(3, config.worker_count);
        assert_eq!(7, config.client_count);
        assert_eq!(15, config.conn_timeout_secs);
        assert_eq!(LogLevel::Debug, config.debug_log_level);
        assert!(config.debug_log_file.is_some());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = EngineConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn secure_mode_requires_key_material() {
        let mut config = EngineConfig::default();
        config.secure = true;
        assert!(config.validate().is_err());

        config.ssl_certificate = Some("/tmp/cert.pem".into());
        config.ssl_key = Some("/tmp/key.pem".into());
        config.validate().expect("cert and key provided");
    }

    #[test]
    fn contradictory_ssl_options_are_rejected() {
        let mut config = EngineConfig::default();
        config.ssl_options = SSL_OPT_NO_TLS12 | SSL_OPT_NO_TLS13;
        assert!(config.validate().is_err());
    }

    #[test]
    fn body_cap_converts_megabytes() {
        let mut config = EngineConfig::default();
        config.max_data_per_conn_mb = 2;
        assert_eq!(2 * 1024 * 1024, config.max_data_per_conn_bytes());
    }
}
