use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::services::actions::help_text;

/// What the binary runs once configuration is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Chat,
    Logout,
}

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn env_name(key: ConfigKey) -> String {
    return format!(
        "TYREN_{}",
        key.to_string().to_uppercase().replace('-', "_")
    );
}

fn arg_config(key: ConfigKey, help: &str) -> Arg {
    let default = Config::default(key);
    let help = if default.is_empty() || key.is_secret() {
        help.to_string()
    } else {
        format!("{help} [default: {default}]")
    };

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env_name(key))
        .hide_env_values(key.is_secret())
        .num_args(1)
        .help(help)
        .global(true);
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") || line.starts_with("HOTKEYS:") {
                return Paint::new(format!("CHAT {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("tyren")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(Command::new("serve").about("Runs the relay server in front of Gemini."))
        .subcommand(Command::new("chat").about("Starts a chat against a relay. This is the default."))
        .subcommand(Command::new("logout").about("Forgets the credential stored on this device."))
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .arg(
            arg_config(ConfigKey::ConfigFile, "Path to configuration file.")
                .short('c'),
        )
        .arg(arg_config(ConfigKey::DataDir, "Directory holding chat history and the stored credential."))
        .arg(
            arg_config(ConfigKey::RelayURL, "Relay URL the chat client connects to.")
                .short('u'),
        )
        .arg(arg_config(ConfigKey::ListenAddress, "Address the relay server listens on."))
        .arg(arg_config(ConfigKey::AccessPassword, "Shared password users log in with. Logins are refused while unset."))
        .arg(arg_config(ConfigKey::SessionSecret, "Secret credentials are derived from. Falls back to the Gemini token."))
        .arg(arg_config(ConfigKey::GeminiToken, "Gemini API token used by the relay server."))
        .arg(arg_config(ConfigKey::GeminiURL, "Gemini API URL. Can be swapped to a compatible proxy."))
        .arg(
            arg_config(ConfigKey::Model, "Gemini model answering chats.")
                .short('m'),
        )
        .arg(arg_config(ConfigKey::HistoryWindow, "Number of most recent messages sent along with every chat."))
        .arg(arg_config(ConfigKey::RenderInterval, "Minimum time in milliseconds between two renders of a streaming answer."))
        .arg(arg_config(ConfigKey::SaveDebounce, "Quiet period in milliseconds before chat history is written to disk."))
        .arg(arg_config(ConfigKey::AuthFailureDelay, "Time in milliseconds the relay waits before answering a failed login."));
}

async fn load(matches: &ArgMatches, subcmd_matches: &ArgMatches) -> Result<()> {
    return Config::load(vec![matches, subcmd_matches]).await;
}

/// Parses the command line and loads configuration. Returns `None` when the
/// command was fully handled and the process should exit.
pub async fn parse() -> Result<Option<Mode>> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("serve", subcmd_matches)) => {
            load(&matches, subcmd_matches).await?;
            return Ok(Some(Mode::Serve));
        }
        Some(("chat", subcmd_matches)) => {
            load(&matches, subcmd_matches).await?;
            return Ok(Some(Mode::Chat));
        }
        Some(("logout", subcmd_matches)) => {
            load(&matches, subcmd_matches).await?;
            return Ok(Some(Mode::Logout));
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(None);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(None);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(None);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(None);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(None);
            }
        },
        _ => {
            Config::load(vec![&matches]).await?;
            return Ok(Some(Mode::Chat));
        }
    }
}
