use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where the client should take its credentials from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialSource {
    /// Path to a credentials blob on disk.
    File(PathBuf),
    /// Inline credentials blob (JSON).
    Json(String),
}

impl CredentialSource {
    /// Read the credentials blob.
    pub fn load(&self) -> Result<Vec<u8>, ConfigError> {
        match self {
            Self::File(path) => std::fs::read(path)
                .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display()))),
            Self::Json(json) => Ok(json.clone().into_bytes()),
        }
    }
}

/// Parsed adapter parameters shared by the store, importer and exporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Addressing scheme, e.g. `gcs`.
    pub scheme: String,
    pub bucket: String,
    /// Path prefix inside the bucket, without leading or trailing `/`.
    pub path: String,
    pub credentials: Option<CredentialSource>,
    /// Alternate service endpoint (emulators, compatible stores).
    pub endpoint: Option<String>,
    /// Disable authentication entirely.
    pub no_auth: bool,
}

impl StoreConfig {
    pub const DEFAULT_SCHEME: &'static str = "gcs";

    /// Config for `bucket` and `path` with default options.
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: Self::DEFAULT_SCHEME.to_string(),
            bucket: bucket.into(),
            path: path.into().trim_matches('/').to_string(),
            credentials: None,
            endpoint: None,
            no_auth: false,
        }
    }

    /// Build a config from user-supplied key/value parameters.
    ///
    /// Recognized keys: `location` (required), `credentials_file`,
    /// `credentials_json`, `endpoint`, `no_auth`. Any other key is an error.
    pub fn from_params(scheme: &str, params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        // Sorted so the reported error does not depend on map order.
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();

        let mut location = None;
        let mut credentials_file = None;
        let mut credentials_json = None;
        let mut endpoint = None;
        let mut no_auth = false;

        for key in keys {
            let value = &params[key];
            match key.as_str() {
                "location" => location = Some(value.as_str()),
                "credentials_file" => credentials_file = Some(PathBuf::from(value)),
                "credentials_json" => {
                    serde_json::from_str::<serde_json::Value>(value).map_err(|e| {
                        ConfigError::InvalidValue {
                            option: "credentials_json",
                            value: String::from("<redacted>"),
                            reason: e.to_string(),
                        }
                    })?;
                    credentials_json = Some(value.clone());
                }
                "endpoint" => endpoint = Some(value.clone()),
                "no_auth" => {
                    no_auth = parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                        option: "no_auth",
                        value: value.clone(),
                        reason: "expected a boolean".into(),
                    })?;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }

        let credentials = match (credentials_file, credentials_json) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::ConflictingCredentials(
                    "credentials_file and credentials_json are mutually exclusive".into(),
                ))
            }
            (Some(path), None) => Some(CredentialSource::File(path)),
            (None, Some(json)) => Some(CredentialSource::Json(json)),
            (None, None) => None,
        };
        if no_auth && credentials.is_some() {
            return Err(ConfigError::ConflictingCredentials(
                "no_auth cannot be combined with credentials".into(),
            ));
        }

        let location = location.ok_or(ConfigError::MissingOption("location"))?;
        let (bucket, path) = parse_location(scheme, location)?;

        Ok(Self {
            scheme: scheme.to_string(),
            bucket,
            path,
            credentials,
            endpoint,
            no_auth,
        })
    }

    /// Logical address of the configured prefix: `scheme://bucket/path`.
    pub fn location(&self) -> String {
        if self.path.is_empty() {
            format!("{}://{}", self.scheme, self.bucket)
        } else {
            format!("{}://{}/{}", self.scheme, self.bucket, self.path)
        }
    }

    /// The path prefix as an absolute tree path (`/` when empty).
    pub fn root(&self) -> String {
        format!("/{}", self.path)
    }

    /// Join `rel` onto the path prefix, producing an object key.
    pub fn key(&self, rel: &str) -> String {
        let rel = rel.trim_start_matches('/');
        match (self.path.is_empty(), rel.is_empty()) {
            (true, _) => rel.to_string(),
            (false, true) => self.path.clone(),
            (false, false) => format!("{}/{}", self.path, rel),
        }
    }
}

/// Split `[scheme://]bucket[/path]` into bucket and trimmed path.
fn parse_location(scheme: &str, location: &str) -> Result<(String, String), ConfigError> {
    let prefix = format!("{scheme}://");
    let rest = location.strip_prefix(prefix.as_str()).unwrap_or(location);
    let (bucket, path) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(ConfigError::InvalidLocation(location.to_string()));
    }
    Ok((bucket.to_string(), path.trim_matches('/').to_string()))
}

/// Accepts the usual spellings: `1 t T TRUE true True 0 f F FALSE false False`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
