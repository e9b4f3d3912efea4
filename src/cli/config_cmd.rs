//! Config subcommand handling

use crate::application::ports::{ConfigError, ConfigStore};
use crate::domain::AppConfig;

use super::args::ConfigAction;
use super::presenter::Presenter;

const VALID_KEYS: &str = "endpoint, chunk_bytes, max_file_bytes, bitrate_kbps, data_dir";

/// Handle a `config` subcommand against the given store.
pub async fn handle_config_command(
    action: ConfigAction,
    store: &impl ConfigStore,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => {
            store.init().await?;
            presenter.success(&format!("Created {}", store.path().display()));
            Ok(())
        }

        ConfigAction::Set { key, value } => {
            let mut config = store.load().await?;
            set_key(&mut config, &key, &value)?;
            store.save(&config).await?;
            presenter.success(&format!("Set {} = {}", key, value));
            Ok(())
        }

        ConfigAction::Get { key } => {
            let config = store.load().await?;
            match get_key(&config, &key) {
                Some(value) => {
                    presenter.line(&value);
                    Ok(())
                }
                None => Err(ConfigError::ValidationError {
                    key,
                    message: format!("Unknown key. Valid keys: {}", VALID_KEYS),
                }),
            }
        }

        ConfigAction::List => {
            let config = store.load().await?;
            presenter.line(&format!(
                "endpoint = {}",
                config.endpoint.as_deref().unwrap_or("(unset)")
            ));
            presenter.line(&format!("chunk_bytes = {}", config.chunk_bytes_or_default()));
            presenter.line(&format!(
                "max_file_bytes = {}",
                config.max_file_bytes_or_default()
            ));
            presenter.line(&format!(
                "bitrate_kbps = {}",
                config.bitrate_kbps_or_default()
            ));
            presenter.line(&format!(
                "data_dir = {}",
                config.data_dir.as_deref().unwrap_or("(default)")
            ));
            Ok(())
        }

        ConfigAction::Path => {
            presenter.line(&store.path().display().to_string());
            Ok(())
        }
    }
}

fn set_key(config: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "endpoint" => config.endpoint = Some(value.to_string()),
        "data_dir" => config.data_dir = Some(value.to_string()),
        "chunk_bytes" => config.chunk_bytes = Some(parse_u64(key, value)?),
        "max_file_bytes" => config.max_file_bytes = Some(parse_u64(key, value)?),
        "bitrate_kbps" => {
            config.bitrate_kbps = Some(parse_u64(key, value)? as u32);
        }
        _ => {
            return Err(ConfigError::ValidationError {
                key: key.to_string(),
                message: format!("Unknown key. Valid keys: {}", VALID_KEYS),
            })
        }
    }
    Ok(())
}

fn get_key(config: &AppConfig, key: &str) -> Option<String> {
    match key {
        "endpoint" => Some(config.endpoint.clone().unwrap_or_default()),
        "data_dir" => Some(config.data_dir.clone().unwrap_or_default()),
        "chunk_bytes" => Some(config.chunk_bytes_or_default().to_string()),
        "max_file_bytes" => Some(config.max_file_bytes_or_default().to_string()),
        "bitrate_kbps" => Some(config.bitrate_kbps_or_default().to_string()),
        _ => None,
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::ValidationError {
            key: key.to_string(),
            message: format!("Invalid number: \"{}\"", value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_known_keys() {
        let mut config = AppConfig::empty();
        set_key(&mut config, "endpoint", "http://x/upload").unwrap();
        set_key(&mut config, "chunk_bytes", "16384").unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://x/upload"));
        assert_eq!(config.chunk_bytes, Some(16384));
    }

    #[test]
    fn set_unknown_key_fails() {
        let mut config = AppConfig::empty();
        let err = set_key(&mut config, "nope", "1").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn set_invalid_number_fails() {
        let mut config = AppConfig::empty();
        let err = set_key(&mut config, "chunk_bytes", "lots").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn get_unknown_key_is_none() {
        assert!(get_key(&AppConfig::empty(), "nope").is_none());
    }
}
