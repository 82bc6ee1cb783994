use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Credentials for the GET-based rendering proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenRowsCredentials {
    pub api_key: String,
}

/// Credentials for the POST-based scraping API (HTTP basic auth).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OxylabsCredentials {
    pub username: String,
    pub password: String,
}

/// Which evasion provider, if any, a pipeline may fall back to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EvasionConfig {
    #[default]
    Disabled,
    ZenRows(ZenRowsCredentials),
    Oxylabs(OxylabsCredentials),
}

impl EvasionConfig {
    /// Build the configuration from optional credential sets.
    ///
    /// Supplying both providers is a fatal configuration error.
    pub fn from_credentials(
        zenrows: Option<ZenRowsCredentials>,
        oxylabs: Option<OxylabsCredentials>,
    ) -> Result<Self, ConfigError> {
        match (zenrows, oxylabs) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingEvasionProviders),
            (Some(creds), None) => {
                if creds.api_key.trim().is_empty() {
                    return Err(ConfigError::InvalidCredential("empty zenrows api key".into()));
                }
                Ok(EvasionConfig::ZenRows(creds))
            }
            (None, Some(creds)) => {
                if creds.username.trim().is_empty() {
                    return Err(ConfigError::InvalidCredential("empty oxylabs username".into()));
                }
                Ok(EvasionConfig::Oxylabs(creds))
            }
            (None, None) => Ok(EvasionConfig::Disabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, EvasionConfig::Disabled)
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        match self {
            EvasionConfig::Disabled => None,
            EvasionConfig::ZenRows(_) => Some("zenrows"),
            EvasionConfig::Oxylabs(_) => Some("oxylabs"),
        }
    }
}
