use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::field::{FieldDefinition, FieldType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("cannot read schema file {path}: {source}")]
    SchemaRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid schema file {path}: {source}")]
    SchemaParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// List server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Display name of the list, also the export filename prefix
    pub list_name: String,
    /// Page size of the data endpoint when the request gives none
    pub rows_per_page: usize,
    pub max_export_rows: usize,
    /// JSON file with `{"fields": [...]}`; the default schema is used when unset
    pub schema_file: Option<PathBuf>,
    /// Snapshot of the list contents; in-memory only when unset
    pub data_file: Option<PathBuf>,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            list_name: "List".to_string(),
            rows_per_page: 100,
            max_export_rows: 10_000,
            schema_file: None,
            data_file: None,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable lookup; unset or empty
    /// variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = ServerConfig::default();

        Ok(ServerConfig {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_number("PORT", get("PORT"), defaults.port)?,
            list_name: get("LIST_NAME").unwrap_or(defaults.list_name),
            rows_per_page: parse_number("ROWS_PER_PAGE", get("ROWS_PER_PAGE"), defaults.rows_per_page)?,
            max_export_rows: parse_number(
                "MAX_EXPORT_ROWS",
                get("MAX_EXPORT_ROWS"),
                defaults.max_export_rows,
            )?,
            schema_file: get("SCHEMA_FILE").map(PathBuf::from),
            data_file: get("DATA_FILE").map(PathBuf::from),
            static_dir: get("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Field schema of the list: from `schema_file`, or a single required
    /// `Title` column
    pub fn load_fields(&self) -> Result<Vec<FieldDefinition>, ConfigError> {
        #[derive(Deserialize)]
        struct SchemaFile {
            fields: Vec<FieldDefinition>,
        }

        let Some(path) = &self.schema_file else {
            return Ok(default_fields());
        };
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::SchemaRead {
            path: path.clone(),
            source,
        })?;
        let schema: SchemaFile =
            serde_json::from_str(&raw).map_err(|source| ConfigError::SchemaParse {
                path: path.clone(),
                source,
            })?;
        Ok(schema.fields)
    }
}

pub fn default_fields() -> Vec<FieldDefinition> {
    vec![FieldDefinition::new("Title", "Title", FieldType::Text).required()]
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
