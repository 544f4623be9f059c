#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

mod application;
mod configuration;
mod domain;
mod infrastructure;

use std::env;
use std::process;

use anyhow::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use yansi::Paint;

use crate::application::chat;
use crate::application::cli;
use crate::application::cli::Mode;
use crate::application::server;

fn handle_error(err: Error) {
    eprintln!(
        "{}",
        Paint::red(format!(
            "Oh no! Tyren has failed with the following app version and error.\n\nVersion: {}\nError: {}",
            env!("CARGO_PKG_VERSION"),
            err
        ))
    );

    let backtrace = err.backtrace();
    if backtrace.to_string() == "disabled backtrace" {
        let args = env::args().collect::<Vec<String>>().join(" ");
        eprintln!("\nRunning the following can help explain further what the issue is:");
        eprintln!("\nRUST_BACKTRACE=1 {args}");
    } else {
        eprintln!("\n{}", backtrace);
    }

    process::exit(1);
}

fn log_dir() -> String {
    if let Ok(dir) = env::var("TYREN_LOG_DIR") {
        return dir;
    }

    return dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("tyren")
        .to_string_lossy()
        .to_string();
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let ready_res = cli::parse().await;
    let mode = match ready_res {
        Ok(Some(mode)) => mode,
        Ok(None) => process::exit(0),
        Err(err) => {
            handle_error(err);
            return;
        }
    };

    let file_appender = tracing_appender::rolling::never(log_dir(), "debug.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    let debug_log = env::var("RUST_LOG")
        .unwrap_or_else(|_| return "".to_string())
        .contains("tyren");

    let file_layer = debug_log.then(|| {
        return tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::new("tyren=debug"));
    });
    // The relay runs unattended, so it reports to stdout as well.
    let stdout_layer = (mode == Mode::Serve).then(|| {
        return tracing_subscriber::fmt::layer().with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new("tyren=info")),
        );
    });
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let res = match mode {
        Mode::Serve => server::start().await,
        Mode::Chat => chat::start().await,
        Mode::Logout => chat::logout().await,
    };

    if let Err(err) = res {
        handle_error(err);
    }

    process::exit(0);
}
