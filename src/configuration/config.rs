#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    AccessPassword,
    AuthFailureDelay,
    ConfigFile,
    DataDir,
    GeminiToken,
    GeminiURL,
    HistoryWindow,
    ListenAddress,
    Model,
    RelayURL,
    RenderInterval,
    SaveDebounce,
    SessionSecret,
}

impl ConfigKey {
    /// Keys holding a number of milliseconds or a count.
    pub fn is_numeric(&self) -> bool {
        return matches!(
            self,
            ConfigKey::AuthFailureDelay
                | ConfigKey::HistoryWindow
                | ConfigKey::RenderInterval
                | ConfigKey::SaveDebounce
        );
    }

    /// Keys never written to the default config file with a value.
    pub fn is_secret(&self) -> bool {
        return matches!(
            self,
            ConfigKey::AccessPassword | ConfigKey::GeminiToken | ConfigKey::SessionSecret
        );
    }
}

fn tyren_dir(base: Option<path::PathBuf>) -> path::PathBuf {
    return base.unwrap_or_else(env::temp_dir).join("tyren");
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn parse<T: FromStr>(key: ConfigKey) -> Result<T> {
        let val = Config::get(key);
        return val
            .trim()
            .parse::<T>()
            .map_err(|_| return anyhow!("Config key '{key}' has an invalid value: {val}"));
    }

    pub fn millis(key: ConfigKey) -> Result<Duration> {
        return Ok(Duration::from_millis(Config::parse::<u64>(key)?));
    }

    pub fn default(key: ConfigKey) -> String {
        let config_path = tyren_dir(dirs::config_dir()).join("config.toml");
        let data_path = tyren_dir(dirs::data_dir());

        let res = match key {
            ConfigKey::AccessPassword => "".to_string(),
            ConfigKey::AuthFailureDelay => "2000".to_string(),
            ConfigKey::DataDir => data_path.to_string_lossy().to_string(),
            ConfigKey::GeminiToken => "".to_string(),
            ConfigKey::GeminiURL => "https://generativelanguage.googleapis.com".to_string(),
            ConfigKey::HistoryWindow => "12".to_string(),
            ConfigKey::ListenAddress => "127.0.0.1:3000".to_string(),
            ConfigKey::Model => "gemini-2.0-flash-exp".to_string(),
            ConfigKey::RelayURL => "http://localhost:3000".to_string(),
            ConfigKey::RenderInterval => "50".to_string(),
            ConfigKey::SaveDebounce => "800".to_string(),
            ConfigKey::SessionSecret => "".to_string(),

            // Special
            ConfigKey::ConfigFile => config_path.to_string_lossy().to_string(),
        };

        return res;
    }

    pub async fn load(clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    if let Some(val_int) = val.as_integer() {
                        if val_int < 0 {
                            bail!(format!("config.toml has a negative value for key '{key}': {val_int}"));
                        }
                        Config::set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        Config::set(key, val_str);
                    } else {
                        bail!(format!("config.toml has an invalid value for key '{key}'"));
                    }
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        for key in ConfigKey::iter().filter(|key| return key.is_numeric()) {
            Config::parse::<u64>(key)?;
        }

        tracing::debug!(
            data_dir = Config::get(ConfigKey::DataDir),
            relay_url = Config::get(ConfigKey::RelayURL),
            listen_address = Config::get(ConfigKey::ListenAddress),
            model = Config::get(ConfigKey::Model),
            history_window = Config::get(ConfigKey::HistoryWindow),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let description = cmd
                    .get_arguments()
                    .find(|arg| return arg.get_long() == Some(key.to_string().as_str()))
                    .and_then(|arg| return arg.get_help())
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                let description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let mut val = Config::default(key);
                if val.is_empty() || key.is_secret() {
                    val = format!("# {key} = \"\"");
                } else if key.is_numeric() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
