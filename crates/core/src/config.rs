use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::SlotPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub restaurant: RestaurantConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Booking rules exposed to operators. Slot capacity and max party size are
/// configuration on purpose; the store reads them through `slot_policy`.
#[derive(Clone, Debug)]
pub struct RestaurantConfig {
    pub name: String,
    pub phone: String,
    pub slot_capacity: u32,
    pub max_party_size: u32,
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub slot_minutes: u32,
}

impl RestaurantConfig {
    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            capacity: self.slot_capacity,
            max_party_size: self.max_party_size,
            opening_hour: self.opening_hour,
            closing_hour: self.closing_hour,
            slot_minutes: self.slot_minutes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct VoiceConfig {
    /// Voice-provider API key. Only needed for outbound provider calls, so
    /// it stays optional; inbound webhooks work without it.
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub slot_capacity: Option<u32>,
    pub max_party_size: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 8000 },
            restaurant: RestaurantConfig {
                name: "Pizza Palace".to_string(),
                phone: "+1234567890".to_string(),
                slot_capacity: 1,
                max_party_size: 8,
                opening_hour: 11,
                closing_hour: 22,
                slot_minutes: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "openai/gpt-4-turbo-preview".to_string(),
                timeout_secs: 30,
            },
            voice: VoiceConfig { api_key: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    restaurant: Option<RestaurantPatch>,
    llm: Option<LlmPatch>,
    voice: Option<VoicePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RestaurantPatch {
    name: Option<String>,
    phone: Option<String>,
    slot_capacity: Option<u32>,
    max_party_size: Option<u32>,
    opening_hour: Option<u32>,
    closing_hour: Option<u32>,
    slot_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VoicePatch {
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tablevoice.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(restaurant) = patch.restaurant {
            if let Some(name) = restaurant.name {
                self.restaurant.name = name;
            }
            if let Some(phone) = restaurant.phone {
                self.restaurant.phone = phone;
            }
            if let Some(slot_capacity) = restaurant.slot_capacity {
                self.restaurant.slot_capacity = slot_capacity;
            }
            if let Some(max_party_size) = restaurant.max_party_size {
                self.restaurant.max_party_size = max_party_size;
            }
            if let Some(opening_hour) = restaurant.opening_hour {
                self.restaurant.opening_hour = opening_hour;
            }
            if let Some(closing_hour) = restaurant.closing_hour {
                self.restaurant.closing_hour = closing_hour;
            }
            if let Some(slot_minutes) = restaurant.slot_minutes {
                self.restaurant.slot_minutes = slot_minutes;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(voice) = patch.voice {
            if let Some(api_key_value) = voice.api_key {
                self.voice.api_key = Some(secret_value(api_key_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TABLEVOICE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TABLEVOICE_SERVER_PORT") {
            self.server.port = parse_u16("TABLEVOICE_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_NAME") {
            self.restaurant.name = value;
        }
        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_PHONE") {
            self.restaurant.phone = value;
        }
        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_SLOT_CAPACITY") {
            self.restaurant.slot_capacity =
                parse_u32("TABLEVOICE_RESTAURANT_SLOT_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_MAX_PARTY_SIZE") {
            self.restaurant.max_party_size =
                parse_u32("TABLEVOICE_RESTAURANT_MAX_PARTY_SIZE", &value)?;
        }
        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_OPENING_HOUR") {
            self.restaurant.opening_hour =
                parse_u32("TABLEVOICE_RESTAURANT_OPENING_HOUR", &value)?;
        }
        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_CLOSING_HOUR") {
            self.restaurant.closing_hour =
                parse_u32("TABLEVOICE_RESTAURANT_CLOSING_HOUR", &value)?;
        }
        if let Some(value) = read_env("TABLEVOICE_RESTAURANT_SLOT_MINUTES") {
            self.restaurant.slot_minutes =
                parse_u32("TABLEVOICE_RESTAURANT_SLOT_MINUTES", &value)?;
        }

        let llm_api_key =
            read_env("TABLEVOICE_LLM_API_KEY").or_else(|| read_env("OPENROUTER_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TABLEVOICE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("TABLEVOICE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TABLEVOICE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TABLEVOICE_LLM_TIMEOUT_SECS", &value)?;
        }

        let voice_api_key =
            read_env("TABLEVOICE_VOICE_API_KEY").or_else(|| read_env("RETELL_API_KEY"));
        if let Some(value) = voice_api_key {
            self.voice.api_key = Some(secret_value(value));
        }

        let log_level =
            read_env("TABLEVOICE_LOGGING_LEVEL").or_else(|| read_env("TABLEVOICE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TABLEVOICE_LOGGING_FORMAT").or_else(|| read_env("TABLEVOICE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(slot_capacity) = overrides.slot_capacity {
            self.restaurant.slot_capacity = slot_capacity;
        }
        if let Some(max_party_size) = overrides.max_party_size {
            self.restaurant.max_party_size = max_party_size;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_restaurant(&self.restaurant)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tablevoice.toml"), PathBuf::from("config/tablevoice.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.bind_address must not be empty".to_string(),
        ));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_restaurant(restaurant: &RestaurantConfig) -> Result<(), ConfigError> {
    if restaurant.name.trim().is_empty() {
        return Err(ConfigError::Validation("restaurant.name must not be empty".to_string()));
    }
    if restaurant.slot_capacity == 0 {
        return Err(ConfigError::Validation(
            "restaurant.slot_capacity must be at least 1".to_string(),
        ));
    }
    if restaurant.max_party_size == 0 {
        return Err(ConfigError::Validation(
            "restaurant.max_party_size must be at least 1".to_string(),
        ));
    }
    if restaurant.opening_hour >= restaurant.closing_hour || restaurant.closing_hour > 24 {
        return Err(ConfigError::Validation(
            "restaurant.opening_hour must be before closing_hour, and closing_hour at most 24"
                .to_string(),
        ));
    }
    if restaurant.slot_minutes == 0
        || restaurant.slot_minutes > 60
        || 60 % restaurant.slot_minutes != 0
    {
        return Err(ConfigError::Validation(
            "restaurant.slot_minutes must divide an hour evenly (e.g. 15, 30, 60)".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation("llm.timeout_secs must be in range 1..=300".to_string()));
    }

    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(
            "llm.api_key is required (set TABLEVOICE_LLM_API_KEY or OPENROUTER_API_KEY)"
                .to_string(),
        ));
    }

    if llm.base_url.trim().is_empty() {
        return Err(ConfigError::Validation("llm.base_url must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use secrecy::ExposeSecret;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    fn options_with_key() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-or-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn defaults_load_with_an_api_key_override() {
        let config = AppConfig::load(options_with_key()).expect("defaults should validate");

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.restaurant.name, "Pizza Palace");
        assert_eq!(config.restaurant.slot_capacity, 1);
        assert_eq!(config.restaurant.max_party_size, 8);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn missing_llm_api_key_fails_validation() {
        let result = AppConfig::load(LoadOptions::default());
        let message = result.expect_err("api key is required").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/here.toml")),
            require_file: true,
            overrides: options_with_key().overrides,
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn toml_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[restaurant]
name = "Trattoria Rustica"
slot_capacity = 3
slot_minutes = 15

[llm]
api_key = "sk-or-from-file"
model = "anthropic/claude-3-haiku"

[logging]
format = "json"
"#
        )
        .expect("write patch");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("patched config should validate");

        assert_eq!(config.restaurant.name, "Trattoria Rustica");
        assert_eq!(config.restaurant.slot_capacity, 3);
        assert_eq!(config.restaurant.slot_minutes, 15);
        assert_eq!(config.llm.model, "anthropic/claude-3-haiku");
        assert_eq!(
            config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            Some("sk-or-from-file".to_string())
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn explicit_overrides_win_over_the_patch_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[restaurant]\nslot_capacity = 2\n").expect("write patch");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-or-test".to_string()),
                slot_capacity: Some(5),
                ..ConfigOverrides::default()
            },
        })
        .expect("config should validate");

        assert_eq!(config.restaurant.slot_capacity, 5);
    }

    #[test]
    fn rejects_capacity_zero() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-or-test".to_string()),
                slot_capacity: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        let message = result.expect_err("capacity 0 is invalid").to_string();
        assert!(message.contains("slot_capacity"));
    }

    #[test]
    fn rejects_slot_minutes_that_do_not_divide_an_hour() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[restaurant]\nslot_minutes = 45\n").expect("write patch");

        let result = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: options_with_key().overrides,
        });
        let message = result.expect_err("45 does not divide 60").to_string();
        assert!(message.contains("slot_minutes"));
    }

    #[test]
    fn unterminated_interpolation_is_reported() {
        let error = super::interpolate_env_vars("key = \"${UNCLOSED").expect_err("should fail");
        assert!(matches!(error, ConfigError::UnterminatedInterpolation));
    }

    #[test]
    fn slot_policy_mirrors_restaurant_settings() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-or-test".to_string()),
                slot_capacity: Some(2),
                max_party_size: Some(12),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should validate");

        let policy = config.restaurant.slot_policy();
        assert_eq!(policy.capacity, 2);
        assert_eq!(policy.max_party_size, 12);
        assert_eq!(policy.slot_minutes, 30);
    }
}
