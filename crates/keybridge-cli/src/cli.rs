use clap::{Parser, Subcommand};
use keybridge_core::channel::MethodCall;
use serde_json::json;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keybridge",
    about = "Keychain credential bridge speaking a plugin method channel",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Use a throwaway in-memory store instead of the macOS keychain.
    #[arg(long, global = true)]
    pub memory: bool,
    /// Optional subcommand; defaults to `serve` when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print whether a key is stored.
    ContainsKey { key: String },
    /// Print the value stored under a key.
    Read { key: String },
    /// Print every stored key and value as JSON.
    ReadAll,
    /// Store a value under a key, replacing any existing one.
    Write { key: String, value: String },
    /// Remove a key.
    Delete { key: String },
    /// Answer JSON method calls read line by line from stdin.
    Serve,
    /// Write, read back and delete a probe key.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    /// Method call equivalent of a one-shot operation.
    pub fn method_call(&self) -> Option<MethodCall> {
        let call = match self {
            Command::ContainsKey { key } => MethodCall::new("containsKey", json!({ "key": key })),
            Command::Read { key } => MethodCall::new("read", json!({ "key": key })),
            Command::ReadAll => MethodCall::new("readAll", json!({})),
            Command::Write { key, value } => {
                MethodCall::new("write", json!({ "key": key, "value": value }))
            }
            Command::Delete { key } => MethodCall::new("delete", json!({ "key": key })),
            _ => return None,
        };
        Some(call)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
