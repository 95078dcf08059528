// ABOUTME: Replication configuration - TOML file plus command-line overrides
// ABOUTME: Describes source/target connections, the table list, and run limits

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::tail::DEFAULT_TAIL_LIMIT;
use crate::utils::{
    parse_postgres_url, strip_password_from_url, validate_connection_string, validate_identifier,
    validate_source_target_different, PostgresUrlParts,
};

/// How to reach one database: either a URL or individual fields.
///
/// When `url` is set it takes precedence over the individual fields.
/// `instance` is a free-form server label used only in logs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionDescriptor {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub instance: Option<String>,
}

impl ConnectionDescriptor {
    pub fn from_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    /// True when neither a URL nor a host has been given.
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.host.is_none()
    }

    /// Check that the descriptor has enough to connect.
    pub fn validate(&self, role: &str) -> Result<()> {
        if let Some(url) = &self.url {
            return validate_connection_string(url)
                .with_context(|| format!("Invalid {} connection URL", role));
        }
        if self.host.is_none() {
            bail!(
                "Missing {} connection: set either 'url' or 'host' in [{}]",
                role,
                role
            );
        }
        if self.database.is_none() {
            bail!("Missing 'database' for {} connection", role);
        }
        if self.user.is_none() {
            bail!("Missing 'user' for {} connection", role);
        }
        Ok(())
    }

    /// Host, port, database, and user of the endpoint.
    pub fn endpoint(&self) -> Result<PostgresUrlParts> {
        if let Some(url) = &self.url {
            return parse_postgres_url(url);
        }
        Ok(PostgresUrlParts {
            host: self
                .host
                .as_deref()
                .context("Connection has no host")?
                .to_lowercase(),
            port: self.port.unwrap_or(5432),
            database: self
                .database
                .clone()
                .context("Connection has no database")?,
            user: self.user.clone(),
            password: self.password.clone(),
        })
    }

    /// Human-readable name for logs and reports. Never contains the password.
    pub fn label(&self) -> String {
        let endpoint = match (&self.url, self.endpoint()) {
            (Some(url), _) => {
                strip_password_from_url(url).unwrap_or_else(|_| "(invalid URL)".to_string())
            }
            (None, Ok(parts)) => format!("{}:{}/{}", parts.host, parts.port, parts.database),
            (None, Err(_)) => "(incomplete connection)".to_string(),
        };
        match &self.instance {
            Some(instance) => format!("{} ({})", instance, endpoint),
            None => endpoint,
        }
    }

    /// Build a tokio-postgres configuration.
    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config> {
        if let Some(url) = &self.url {
            return url
                .parse::<tokio_postgres::Config>()
                .with_context(|| format!("Failed to parse connection URL for {}", self.label()));
        }

        let endpoint = self.endpoint()?;
        let mut config = tokio_postgres::Config::new();
        config
            .host(&endpoint.host)
            .port(endpoint.port)
            .dbname(&endpoint.database);
        if let Some(user) = &endpoint.user {
            config.user(user);
        }
        if let Some(password) = &endpoint.password {
            config.password(password);
        }
        if let Some(instance) = &self.instance {
            config.application_name(instance);
        }
        Ok(config)
    }
}

/// Complete settings for one replication run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub source: ConnectionDescriptor,
    pub target: ConnectionDescriptor,
    /// Tables to replicate, in processing order
    pub tables: Vec<String>,
    /// Number of most recent rows read from each source table
    pub tail_limit: u64,
    /// Schema the tables live in, on both sides
    pub schema: String,
    /// Only replicate tables owned by this role
    pub owner: Option<String>,
    /// Directory for end-of-run reports
    pub report_dir: Option<PathBuf>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            source: ConnectionDescriptor::default(),
            target: ConnectionDescriptor::default(),
            tables: Vec::new(),
            tail_limit: DEFAULT_TAIL_LIMIT,
            schema: "public".to_string(),
            owner: None,
            report_dir: None,
        }
    }
}

/// Values given on the command line. Set fields replace file values.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_url: Option<String>,
    pub target_url: Option<String>,
    pub tables: Option<Vec<String>>,
    pub tail_limit: Option<u64>,
    pub schema: Option<String>,
    pub owner: Option<String>,
    pub report_dir: Option<PathBuf>,
}

impl ReplicationConfig {
    /// Load configuration from a TOML file. The result is not yet validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` if given, otherwise start from defaults, then apply overrides and validate.
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.source_url {
            self.source = ConnectionDescriptor {
                instance: self.source.instance.take(),
                ..ConnectionDescriptor::from_url(&url)
            };
        }
        if let Some(url) = overrides.target_url {
            self.target = ConnectionDescriptor {
                instance: self.target.instance.take(),
                ..ConnectionDescriptor::from_url(&url)
            };
        }
        if let Some(tables) = overrides.tables {
            self.tables = tables;
        }
        if let Some(limit) = overrides.tail_limit {
            self.tail_limit = limit;
        }
        if let Some(schema) = overrides.schema {
            self.schema = schema;
        }
        if overrides.owner.is_some() {
            self.owner = overrides.owner;
        }
        if overrides.report_dir.is_some() {
            self.report_dir = overrides.report_dir;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.target.validate("target")?;
        validate_source_target_different(&self.source.endpoint()?, &self.target.endpoint()?)?;

        if self.tables.is_empty() {
            bail!("No tables configured. Set 'tables' in the config file or pass --tables");
        }
        let mut seen = HashSet::new();
        for table in &self.tables {
            validate_identifier(table).context("Invalid table name in configuration")?;
            if !seen.insert(table.as_str()) {
                bail!("Table '{}' is listed more than once", table);
            }
        }

        validate_identifier(&self.schema).context("Invalid schema name")?;

        if self.tail_limit == 0 {
            bail!("tail_limit must be greater than zero");
        }
        Ok(())
    }

    /// Directory reports are written to, defaulting to `~/.tail-replicator/reports`.
    pub fn report_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.report_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home.join(".tail-replicator").join("reports"))
    }
}
