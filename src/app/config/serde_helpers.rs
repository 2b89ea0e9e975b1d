use super::ConfigError;
use clap::ValueEnum;

/// `Duration` as whole milliseconds, matching the `*_MS` settings.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Reads `name`, leaving `target` untouched when it is unset or blank.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Parses a numeric or boolean setting.
pub fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = read_env(name) {
        *target = value
            .trim()
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

/// Parses a setting with a fixed set of names (backend, URL type, log level
/// and so on). The error lists the accepted names.
pub fn load_env_choice<T>(name: &str, target: &mut T, ignore_case: bool) -> Result<(), ConfigError>
where
    T: ValueEnum,
{
    if let Some(value) = read_env(name) {
        *target = T::from_str(value.trim(), ignore_case).map_err(|_| {
            let accepted: Vec<String> = T::value_variants()
                .iter()
                .filter_map(|variant| variant.to_possible_value())
                .map(|v| v.get_name().to_string())
                .collect();
            ConfigError::EnvError(format!(
                "Invalid {name}: {value}. Valid values: {}",
                accepted.join(", ")
            ))
        })?;
    }
    Ok(())
}

/// Optional credentials, names and paths. OpenStack rc files often export
/// blank variables such as `OS_REGION_NAME=`; those count as unset.
pub fn load_env_opt<T: From<String>>(name: &str, target: &mut Option<T>) {
    if let Some(value) = read_env(name) {
        *target = Some(T::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::LogLevel;
    use crate::identity::UrlType;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_blank_variables_count_as_unset() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var("FORWARDER_TEST_REGION", "  ") };
        let mut region = Some("RegionOne".to_string());
        load_env_opt("FORWARDER_TEST_REGION", &mut region);
        unsafe { std::env::remove_var("FORWARDER_TEST_REGION") };

        assert_eq!(region.as_deref(), Some("RegionOne"));
    }

    #[test]
    #[serial]
    fn test_choice_error_lists_accepted_names() {
        unsafe { std::env::set_var("FORWARDER_TEST_URL_TYPE", "privateURL") };
        let mut url_type = UrlType::default();
        let result = load_env_choice("FORWARDER_TEST_URL_TYPE", &mut url_type, false);
        unsafe { std::env::remove_var("FORWARDER_TEST_URL_TYPE") };

        match result {
            Err(ConfigError::EnvError(message)) => {
                assert!(message.contains("internalURL, publicURL, adminURL"));
            }
            other => panic!("Expected EnvError, got {other:?}"),
        }
        assert_eq!(url_type, UrlType::Internal);
    }

    #[test]
    #[serial]
    fn test_choice_ignores_case_when_asked() {
        unsafe { std::env::set_var("FORWARDER_TEST_LOG_LEVEL", " DEBUG ") };
        let mut level = LogLevel::Info;
        let result = load_env_choice("FORWARDER_TEST_LOG_LEVEL", &mut level, true);
        unsafe { std::env::remove_var("FORWARDER_TEST_LOG_LEVEL") };

        assert!(result.is_ok());
        assert_eq!(level, LogLevel::Debug);
    }
}
