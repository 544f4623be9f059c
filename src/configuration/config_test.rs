use anyhow::Result;
use tokio::fs;

use super::Config;
use super::ConfigKey;
use crate::application::cli;

#[test]
fn it_serializes_to_valid_toml() {
    let res = Config::serialize_default(cli::build());
    let toml_res = res.parse::<toml_edit::Document>();
    assert!(toml_res.is_ok());

    assert!(res.contains("history-window = 12"));
    assert!(res.contains("model = \"gemini-2.0-flash-exp\""));
    assert!(res.contains("# access-password = \"\""));
    assert!(res.contains("# gemini-token = \"\""));
    assert!(!res.contains("config-file"));
}

#[test]
fn it_flags_numeric_and_secret_keys() {
    assert!(ConfigKey::SaveDebounce.is_numeric());
    assert!(!ConfigKey::Model.is_numeric());
    assert!(ConfigKey::SessionSecret.is_secret());
    assert!(!ConfigKey::RelayURL.is_secret());
    assert_eq!(ConfigKey::RelayURL.to_string(), "relay-url");
    assert_eq!(ConfigKey::GeminiURL.to_string(), "gemini-url");
}

// Config is process wide, so every load lives in this one test.
#[tokio::test]
async fn it_loads_config_from_file() -> Result<()> {
    let dir = test_utils::temp_dir("tyren-config");
    fs::create_dir_all(&dir).await?;

    let config_file = dir.join("config.toml");
    fs::write(
        &config_file,
        "model = \"gemini-1.5-pro\"\nhistory-window = 6\nrelay-url = \"http://file\"\n",
    )
    .await?;
    let config_file = config_file.to_string_lossy().to_string();

    let matches = cli::build().try_get_matches_from(vec![
        "tyren",
        "chat",
        "--config-file",
        &config_file,
        "--relay-url",
        "http://flag",
    ])?;
    Config::load(vec![&matches]).await?;

    assert_eq!(Config::get(ConfigKey::Model), "gemini-1.5-pro");
    assert_eq!(Config::parse::<usize>(ConfigKey::HistoryWindow)?, 6);
    assert_eq!(Config::get(ConfigKey::RelayURL), "http://flag");
    assert_eq!(Config::get(ConfigKey::RenderInterval), "50");

    let bad_file = dir.join("bad-config.toml");
    fs::write(&bad_file, "model = \n").await?;
    let bad_file = bad_file.to_string_lossy().to_string();
    let matches =
        cli::build().try_get_matches_from(vec!["tyren", "chat", "--config-file", &bad_file])?;
    assert!(Config::load(vec![&matches]).await.is_err());

    let bad_number = dir.join("bad-number.toml");
    fs::write(&bad_number, "save-debounce = \"soon\"\n").await?;
    let bad_number = bad_number.to_string_lossy().to_string();
    let matches =
        cli::build().try_get_matches_from(vec!["tyren", "chat", "--config-file", &bad_number])?;
    assert!(Config::load(vec![&matches]).await.is_err());

    return Ok(());
}
