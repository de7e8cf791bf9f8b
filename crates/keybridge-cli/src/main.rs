mod cli;
mod config;
mod serve;
mod storage;

use clap::Parser;
use color_eyre::{eyre::bail, Result};
use keybridge_core::{
    channel::{MethodChannel, Reply},
    storage::CredentialStore,
};
use serde_json::Value;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);
    match command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config()?,
        command => {
            let config = config::load()?;
            if cli.memory {
                run(&storage::memory_channel(&config), command).await?
            } else {
                run_on_keychain(&config, command).await?
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr; stdout carries replies.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("keybridge {}", env!("CARGO_PKG_VERSION"));
}

fn init_config() -> Result<()> {
    let path = config::write_default_if_missing()?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(target_os = "macos")]
async fn run_on_keychain(config: &config::Config, command: Command) -> Result<()> {
    run(&storage::keychain_channel(config), command).await
}

#[cfg(not(target_os = "macos"))]
async fn run_on_keychain(_config: &config::Config, _command: Command) -> Result<()> {
    bail!("the macOS keychain is not available on this platform; rerun with --memory")
}

async fn run<S: CredentialStore>(channel: &MethodChannel<S>, command: Command) -> Result<()> {
    match command {
        Command::Serve => {
            let stdin = BufReader::new(tokio::io::stdin());
            serve::run(channel, stdin, tokio::io::stdout()).await?;
        }
        Command::Health => {
            run_health(channel).await?;
            println!("Storage: ok");
        }
        // Version and config never reach a channel; `main` answers them.
        Command::Version | Command::Config(_) => {}
        operation => {
            if let Some(call) = operation.method_call() {
                println!("{}", render_reply(channel.handle(call).await)?);
            }
        }
    }
    Ok(())
}

/// Text printed for a one-shot reply; strings are printed bare.
fn render_reply(reply: Reply) -> Result<String> {
    match reply {
        Reply::Success {
            result: Value::String(text),
        } => Ok(text),
        Reply::Success { result } => Ok(serde_json::to_string_pretty(&result)?),
        Reply::Error { code, message } => bail!("{code}: {message}"),
        Reply::NotImplemented => bail!("method not implemented"),
    }
}

async fn run_health<S: CredentialStore>(channel: &MethodChannel<S>) -> Result<()> {
    let adapter = channel.adapter();
    let probe_key = "keybridge/health-probe";
    let payload = "ok";

    adapter.write(probe_key, payload).await?;
    let round_trip = adapter.read(probe_key).await?;
    adapter.delete(probe_key).await?;

    if round_trip.as_deref() != Some(payload) {
        bail!("keychain round-trip failed");
    }
    if adapter.contains_key(probe_key).await? {
        bail!("probe key survived delete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use keybridge_core::storage::InMemoryCredentialStore;

    use super::*;

    fn test_channel() -> MethodChannel<InMemoryCredentialStore> {
        storage::memory_channel(&config::Config::default())
    }

    #[tokio::test]
    async fn health_check_with_memory_store_succeeds() {
        run_health(&test_channel())
            .await
            .expect("health check should succeed");
    }

    #[tokio::test]
    async fn one_shot_replies_render_as_text() {
        let channel = test_channel();
        let write = Command::Write {
            key: "token".into(),
            value: "abc".into(),
        };
        let reply = channel
            .handle(write.method_call().expect("operation"))
            .await;
        assert_eq!(render_reply(reply).expect("render"), "added successfully");

        let reply = channel
            .handle(Command::ReadAll.method_call().expect("operation"))
            .await;
        let rendered = render_reply(reply).expect("render");
        let parsed: Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(parsed, serde_json::json!({"token": "abc"}));
    }

    #[tokio::test]
    async fn local_commands_leave_the_store_untouched() {
        let channel = test_channel();
        run(&channel, Command::Version).await.expect("version");
        run(&channel, Command::Config(ConfigCommand::Init))
            .await
            .expect("config");
        assert!(channel.adapter().read_all().await.expect("read_all").is_empty());
    }

    #[test]
    fn error_replies_become_reports() {
        let err = render_reply(Reply::Error {
            code: "duplicate_item".into(),
            message: "a record already exists for account: k".into(),
        })
        .expect_err("errors should not render");
        assert!(err.to_string().starts_with("duplicate_item"));
    }
}
