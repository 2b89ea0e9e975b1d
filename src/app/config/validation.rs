use super::{Config, ConfigError};
use url::Url;

impl Config {
    /// Names of required fields that are unset or empty, in declaration order.
    pub fn missing_required(&self) -> Vec<String> {
        [
            ("os_auth_url", &self.os_auth_url),
            ("os_username", &self.os_username),
            ("os_password", &self.os_password),
            ("os_tenant_name", &self.os_tenant_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
        .map(|(name, _)| name.to_string())
        .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Every missing field is reported at once
        let field_names = self.missing_required();
        if !field_names.is_empty() {
            return Err(ConfigError::MissingRequiredConfig { field_names });
        }

        if let Some(auth_url) = &self.os_auth_url {
            Url::parse(auth_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid identity URL '{auth_url}': {e}"))
            })?;
        }

        // Validate batch size
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        // Validate timeouts
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.archive_policy.as_deref() == Some("") {
            return Err(ConfigError::InvalidConfig(
                "Archive policy must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }
}
