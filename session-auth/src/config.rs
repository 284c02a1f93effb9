use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::prelude::*;
use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

pub const SECRET_KEY_ENV: &str = "SESSION_AUTH_SECRET_KEY";
const LOGIN_ON_SIGNUP_ENV: &str = "SESSION_AUTH_LOGIN_ON_SIGNUP";
const SECURE_COOKIE_ENV: &str = "SESSION_AUTH_SECURE_COOKIE";

/// Signed cookies need at least 512 bits of key material.
pub const MIN_SECRET_KEY_BYTES: usize = 64;

const DEFAULT_SESSION_TTL: &str = "24h";
/// Upper bound on the session ttl, five years.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(5 * 365 * 24 * 60 * 60);
const DEFAULT_COOKIE_NAME: &str = "session_auth";

#[derive(Debug, Parser)]
#[command(
    name = "session-auth",
    version,
    about = "Cookie-session signup/login service"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    #[arg(long, value_name = "DURATION")]
    pub session_ttl: Option<String>,

    #[arg(long, value_name = "NAME")]
    pub cookie_name: Option<String>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Raw key bytes for cookie signing. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub users_file: Option<PathBuf>,
    pub secret_key: Option<SecretKey>,
    pub session_ttl: Duration,
    pub cookie_name: String,
    pub secure_cookie: bool,
    pub login_on_signup: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid boolean value for env var {key}: {value}")]
    InvalidEnvBool { key: String, value: String },
    #[error("secret key from {origin} is not valid base64")]
    SecretKeyEncoding { origin: String },
    #[error("secret key from {origin} is {len} bytes; at least 64 required")]
    SecretKeyTooShort { origin: String, len: usize },
    #[error("invalid session ttl {value}: {source}")]
    InvalidSessionTtl {
        value: String,
        source: humantime::DurationError,
    },
    #[error("session ttl must be greater than zero")]
    ZeroSessionTtl,
    #[error("session ttl {0} exceeds the five year maximum")]
    SessionTtlTooLarge(String),
    #[error("cookie name {0:?} is not a valid cookie token")]
    InvalidCookieName(String),
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    users_file: Option<PathBuf>,
    secret_key: Option<String>,
    session_ttl: Option<String>,
    cookie_name: Option<String>,
    secure_cookie: Option<bool>,
    login_on_signup: Option<bool>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;

        let bind = cli
            .bind
            .or(from_file.bind)
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5555)));
        let users_file = cli.users_file.or(from_file.users_file);

        let secret_key = match std::env::var(SECRET_KEY_ENV) {
            Ok(raw) => Some(decode_secret_key(SECRET_KEY_ENV, &raw)?),
            Err(_) => from_file
                .secret_key
                .as_deref()
                .map(|raw| decode_secret_key("config file", raw))
                .transpose()?,
        };

        let session_ttl = parse_session_ttl(
            cli.session_ttl
                .as_deref()
                .or(from_file.session_ttl.as_deref())
                .unwrap_or(DEFAULT_SESSION_TTL),
        )?;

        let cookie_name = cli
            .cookie_name
            .or(from_file.cookie_name)
            .unwrap_or_else(|| String::from(DEFAULT_COOKIE_NAME));
        validate_cookie_name(&cookie_name)?;

        let secure_cookie = read_env_bool(SECURE_COOKIE_ENV)?
            .or(from_file.secure_cookie)
            .unwrap_or(false);
        let login_on_signup = read_env_bool(LOGIN_ON_SIGNUP_ENV)?
            .or(from_file.login_on_signup)
            .unwrap_or(false);

        Ok(Self {
            bind,
            users_file,
            secret_key,
            session_ttl,
            cookie_name,
            secure_cookie,
            login_on_signup,
        })
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn decode_secret_key(origin: &str, raw: &str) -> Result<SecretKey, ConfigError> {
    let bytes = BASE64_STANDARD
        .decode(raw.trim())
        .map_err(|_| ConfigError::SecretKeyEncoding {
            origin: String::from(origin),
        })?;
    if bytes.len() < MIN_SECRET_KEY_BYTES {
        return Err(ConfigError::SecretKeyTooShort {
            origin: String::from(origin),
            len: bytes.len(),
        });
    }
    Ok(SecretKey(bytes))
}

fn parse_session_ttl(raw: &str) -> Result<Duration, ConfigError> {
    let ttl = humantime::parse_duration(raw.trim()).map_err(|source| {
        ConfigError::InvalidSessionTtl {
            value: String::from(raw),
            source,
        }
    })?;
    if ttl.is_zero() {
        return Err(ConfigError::ZeroSessionTtl);
    }
    if ttl > MAX_SESSION_TTL {
        return Err(ConfigError::SessionTtlTooLarge(String::from(raw)));
    }
    Ok(ttl)
}

fn validate_cookie_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidCookieName(String::from(name)))
    }
}

fn read_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => parse_bool_value(key, &value).map(Some),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from("<non-unicode>"),
        }),
    }
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from(raw),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::Result;
    use base64::prelude::*;
    use tempfile::tempdir;

    use super::{
        decode_secret_key, parse_bool_value, parse_session_ttl, validate_cookie_name, AppConfig,
        Cli, ConfigError, SecretKey, MAX_SESSION_TTL,
    };

    fn empty_cli() -> Cli {
        Cli {
            bind: None,
            users_file: None,
            session_ttl: None,
            cookie_name: None,
            config: None,
        }
    }

    #[test]
    fn parse_bool_value_accepts_common_true_values() {
        assert_eq!(parse_bool_value("K", "true").ok(), Some(true));
        assert_eq!(parse_bool_value("K", "1").ok(), Some(true));
        assert_eq!(parse_bool_value("K", "YES").ok(), Some(true));
        assert_eq!(parse_bool_value("K", " on ").ok(), Some(true));
    }

    #[test]
    fn parse_bool_value_accepts_common_false_values() {
        assert_eq!(parse_bool_value("K", "false").ok(), Some(false));
        assert_eq!(parse_bool_value("K", "0").ok(), Some(false));
        assert_eq!(parse_bool_value("K", "NO").ok(), Some(false));
        assert_eq!(parse_bool_value("K", " off ").ok(), Some(false));
    }

    #[test]
    fn parse_bool_value_rejects_invalid_values() {
        assert!(parse_bool_value("K", "maybe").is_err());
    }

    #[test]
    fn secret_key_requires_enough_material() {
        let short = BASE64_STANDARD.encode([7u8; 32]);
        assert!(matches!(
            decode_secret_key("test", &short),
            Err(ConfigError::SecretKeyTooShort { len: 32, .. })
        ));

        let long = BASE64_STANDARD.encode([7u8; 64]);
        let key = decode_secret_key("test", &format!(" {long}\n")).unwrap();
        assert_eq!(key.as_bytes().len(), 64);
    }

    #[test]
    fn secret_key_rejects_bad_encoding() {
        assert!(matches!(
            decode_secret_key("test", "not base64!"),
            Err(ConfigError::SecretKeyEncoding { .. })
        ));
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let key = SecretKey(vec![1, 2, 3]);
        assert_eq!(format!("{key:?}"), "SecretKey(<redacted>)");
    }

    #[test]
    fn session_ttl_parses_humantime() {
        assert_eq!(parse_session_ttl("24h").ok(), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_session_ttl("90s").ok(), Some(Duration::from_secs(90)));
        assert!(parse_session_ttl("soon").is_err());
        assert!(matches!(parse_session_ttl("0s"), Err(ConfigError::ZeroSessionTtl)));
    }

    #[test]
    fn session_ttl_rejects_values_past_the_maximum() {
        assert!(matches!(
            parse_session_ttl("500000000000years"),
            Err(ConfigError::SessionTtlTooLarge(_))
        ));
        assert!(matches!(
            parse_session_ttl("6years"),
            Err(ConfigError::SessionTtlTooLarge(_))
        ));
        assert_eq!(
            parse_session_ttl(&format!("{}s", MAX_SESSION_TTL.as_secs())).ok(),
            Some(MAX_SESSION_TTL)
        );
        assert!(time::Duration::try_from(MAX_SESSION_TTL).is_ok());
    }

    #[test]
    fn from_cli_uses_defaults_without_config_file() -> Result<()> {
        let config = AppConfig::from_cli(empty_cli())?;

        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 5555)));
        assert_eq!(config.users_file, None);
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert_eq!(config.cookie_name, "session_auth");
        assert!(!config.secure_cookie);
        assert!(!config.login_on_signup);
        Ok(())
    }

    #[test]
    fn from_cli_reads_config_file_and_cli_takes_precedence() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        let secret = BASE64_STANDARD.encode([9u8; 64]);
        std::fs::write(
            &path,
            format!(
                "bind = \"0.0.0.0:9000\"\nusers_file = \"file-users.toml\"\nsecret_key = \"{secret}\"\nsession_ttl = \"1h\"\ncookie_name = \"file_sid\"\nsecure_cookie = true\nlogin_on_signup = true\n"
            ),
        )?;

        let cli = Cli {
            bind: Some(SocketAddr::from(([127, 0, 0, 1], 7000))),
            cookie_name: Some(String::from("cli_sid")),
            config: Some(path),
            ..empty_cli()
        };
        let config = AppConfig::from_cli(cli)?;

        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 7000)));
        assert_eq!(config.cookie_name, "cli_sid");
        assert_eq!(config.users_file, Some(PathBuf::from("file-users.toml")));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert!(config.secure_cookie);
        assert!(config.login_on_signup);
        let key = config.secret_key.unwrap();
        assert_eq!(key.as_bytes(), &[9u8; 64][..]);
        Ok(())
    }

    #[test]
    fn from_cli_session_ttl_flag_overrides_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "session_ttl = \"1h\"\n")?;

        let cli = Cli {
            session_ttl: Some(String::from("15m")),
            config: Some(path),
            ..empty_cli()
        };
        let config = AppConfig::from_cli(cli)?;

        assert_eq!(config.session_ttl, Duration::from_secs(900));
        Ok(())
    }

    #[test]
    fn from_cli_rejects_invalid_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bind = 5555\n").unwrap();

        let cli = Cli {
            config: Some(path),
            ..empty_cli()
        };
        assert!(matches!(
            AppConfig::from_cli(cli),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn cookie_name_must_be_a_token() {
        assert!(validate_cookie_name("session_auth").is_ok());
        assert!(validate_cookie_name("sid-2.v").is_ok());
        assert!(validate_cookie_name("").is_err());
        assert!(validate_cookie_name("bad name").is_err());
        assert!(validate_cookie_name("a;b").is_err());
    }
}
