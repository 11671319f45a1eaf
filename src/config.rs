use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

pub const SECRET_ENV_VAR: &str = "ALCHEMAX_SECRET_KEY";

#[derive(Parser, Debug)]
#[command(name = "alchemax", about = "A social groups backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Grant the admin flag to an existing account
    PromoteAdmin {
        #[arg(long)]
        username: String,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub secret: Option<String>,
    pub token_ttl_minutes: i64,
    pub bcrypt_cost: u32,
    pub revocation_sweep_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_minutes: 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            revocation_sweep_secs: 300,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "https://alchemaxdemo.co.uk".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // The environment wins over the file so the secret can stay out of it
        if let Ok(secret) = std::env::var(SECRET_ENV_VAR) {
            if !secret.is_empty() {
                config.auth.secret = Some(secret);
            }
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("alchemax.db"));
        }

        if config.auth.token_ttl_minutes <= 0 {
            anyhow::bail!("auth.token_ttl_minutes must be positive");
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".alchemax")
        })
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.database.path.as_ref()
    }

    /// The signing secret, or an error explaining how to provide one.
    pub fn secret(&self) -> anyhow::Result<&str> {
        self.auth
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No signing secret configured: set auth.secret or {}",
                    SECRET_ENV_VAR
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(data_dir: PathBuf, config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            host: None,
            port: None,
            data_dir: Some(data_dir),
            command: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.token_ttl_minutes, 60);
        assert_eq!(config.auth.revocation_sweep_secs, 300);
        assert!(config.auth.secret.is_none());
        assert!(config.database.path.is_none());
        assert_eq!(config.cors.allowed_origins.len(), 2);
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_with(PathBuf::from("/tmp/test-alchemax"), None);
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-alchemax"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = cli_with(tmp.path().to_path_buf(), None);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.db_path(), Some(&tmp.path().join("alchemax.db")));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[auth]
secret = "file-secret"
token_ttl_minutes = 15

[cors]
allowed_origins = ["http://example.test"]
"#,
        )
        .unwrap();

        let cli = cli_with(tmp.path().to_path_buf(), Some(config_path));
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.token_ttl_minutes, 15);
        assert_eq!(config.cors.allowed_origins, vec!["http://example.test"]);
        if std::env::var(SECRET_ENV_VAR).is_err() {
            assert_eq!(config.secret().unwrap(), "file-secret");
        }
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
            command: None,
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[auth]\ntoken_ttl_minutes = 0\n").unwrap();

        let cli = cli_with(tmp.path().to_path_buf(), Some(config_path));
        assert!(Config::load(&cli).is_err());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let config = Config::default();
        assert!(config.secret().is_err());
    }
}
