use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_AUTH_SESSION_URL: &str =
    "https://demobackend.emergentagent.com/auth/v1/env/oauth/session-data";

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Upper bound on session lifetime; keeps every expiry inside four-digit years.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// Runtime settings. Each flag falls back to its environment variable
/// (an optional `.env` is loaded first), then to the default.
#[derive(Parser, Debug, Clone)]
#[command(name = "interview-practice-api")]
#[command(version, about = "Interview practice REST backend")]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "interview.db")]
    pub database_path: String,

    /// Directory receiving uploaded media
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Comma-separated CORS allow-list; `*` allows any origin
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Identity-provider endpoint for session exchange
    #[arg(long, env = "AUTH_SESSION_URL", default_value = DEFAULT_AUTH_SESSION_URL)]
    pub auth_session_url: String,

    /// Session lifetime and cookie max-age, in days
    #[arg(
        long,
        env = "SESSION_TTL_DAYS",
        default_value_t = 7,
        value_parser = clap::value_parser!(i64).range(1..=MAX_SESSION_TTL_DAYS)
    )]
    pub session_ttl_days: i64,

    /// Body limit for media uploads, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl Config {
    /// The allow-list entries, trimmed, blanks dropped.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(args: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(std::iter::once("interview-practice-api").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_path, "interview.db");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.auth_session_url, DEFAULT_AUTH_SESSION_URL);
        assert_eq!(config.session_ttl_days, 7);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.cors_origin_list(), vec!["*"]);
    }

    #[test]
    fn test_cors_list_is_split_and_trimmed() {
        let config = config_from(&[
            "--cors-origins",
            "https://app.example.com, http://localhost:3000,",
        ])
        .unwrap();
        assert_eq!(
            config.cors_origin_list(),
            vec!["https://app.example.com", "http://localhost:3000"]
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&["--bind-addr", "not-an-address"]).is_err());
        assert!(config_from(&["--session-ttl-days", "seven"]).is_err());
        assert!(config_from(&["--session-ttl-days", "0"]).is_err());
        assert!(config_from(&["--max-upload-bytes", "lots"]).is_err());
    }

    #[test]
    fn test_session_ttl_is_capped() {
        let config = config_from(&["--session-ttl-days", "3650"]).unwrap();
        assert_eq!(config.session_ttl_days, MAX_SESSION_TTL_DAYS);

        assert!(config_from(&["--session-ttl-days", "3651"]).is_err());
        assert!(config_from(&["--session-ttl-days", "4000000"]).is_err());
    }
}
