//! `logvis` command-line client.
//!
//! # Responsibility
//! - Build the store configuration from flags and environment variables.
//! - Run one channel/entry operation and print its result as JSON.
//!
//! # Invariants
//! - Results go to stdout; logs and failures go to stderr.
//! - Exit code is 2 for missing channels or entries, 1 for any other failure.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use logvis_core::{
    application_info, init_logging, ElasticsearchConfig, ErrorKind, LogvisService, SqliteConfig,
    StoreConfig,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "logvis", about = "Channel and entry store client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store backend.
    #[arg(long, global = true, value_enum, default_value_t = Backend::Sqlite, env = "LOGVIS_STORE")]
    store: Backend,

    /// SQLite database file (in-memory when omitted).
    #[arg(long, global = true, env = "LOGVIS_SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    /// Elasticsearch node address.
    #[arg(
        long,
        global = true,
        default_value = logvis_core::DEFAULT_ELASTIC_URL,
        env = "LOGVIS_ELASTIC_URL"
    )]
    elastic_url: String,

    #[arg(long, global = true, env = "LOGVIS_ELASTIC_USERNAME")]
    elastic_username: Option<String>,

    #[arg(long, global = true, env = "LOGVIS_ELASTIC_PASSWORD", hide_env_values = true)]
    elastic_password: Option<String>,

    /// Accept self-signed certificates.
    #[arg(long, global = true, default_value_t = false, env = "LOGVIS_ELASTIC_INSECURE")]
    elastic_insecure: bool,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "LOGVIS_ELASTIC_TIMEOUT_SECS")]
    elastic_timeout_secs: Option<u64>,

    /// Make writes visible to search before returning.
    #[arg(long, global = true, default_value_t = false, env = "LOGVIS_ELASTIC_REFRESH")]
    elastic_refresh: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn", env = "LOGVIS_LOG_LEVEL")]
    log_level: String,

    /// Absolute directory for rotating log files (stderr when omitted).
    #[arg(long, global = true, env = "LOGVIS_LOG_DIR")]
    log_dir: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Sqlite,
    Elasticsearch,
}

#[derive(Subcommand)]
enum Commands {
    /// Print package metadata.
    Info,
    /// Manage channels.
    Channels {
        #[command(subcommand)]
        action: ChannelAction,
    },
    /// Manage entries inside a channel.
    Entries {
        #[command(subcommand)]
        action: EntryAction,
    },
}

#[derive(Subcommand)]
enum ChannelAction {
    List,
    Create,
    Get { channel_id: String },
    Delete { channel_id: String },
}

#[derive(Subcommand)]
enum EntryAction {
    List {
        channel_id: String,
        /// Include store search metadata in the output.
        #[arg(long, default_value_t = false)]
        diagnostics: bool,
    },
    Create {
        channel_id: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        message: String,
        /// Arbitrary JSON value attached to the entry.
        #[arg(long, value_parser = parse_metadata)]
        metadata: Option<Value>,
        /// RFC 3339 instant; defaults to now.
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },
    Get {
        channel_id: String,
        entry_id: String,
    },
    Delete {
        channel_id: String,
        entry_id: String,
    },
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        match self.store {
            Backend::Sqlite => StoreConfig::Sqlite(SqliteConfig {
                path: self.sqlite_path.clone(),
            }),
            Backend::Elasticsearch => StoreConfig::Elasticsearch(ElasticsearchConfig {
                url: self.elastic_url.clone(),
                username: self.elastic_username.clone(),
                password: self.elastic_password.clone(),
                accept_invalid_certs: self.elastic_insecure,
                request_timeout_secs: self.elastic_timeout_secs,
                refresh_on_write: self.elastic_refresh,
            }),
        }
    }
}

fn parse_metadata(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|err| format!("metadata must be JSON: {err}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_dir.as_deref())
        .map_err(anyhow::Error::msg)
        .context("failed to initialize logging")?;

    if let Commands::Info = cli.command {
        print_json(&json!({ "data": application_info() }))?;
        return Ok(ExitCode::SUCCESS);
    }

    let service =
        LogvisService::from_config(&cli.store_config()).context("failed to open store")?;

    match run(&service, cli.command).await {
        Ok(output) => {
            print_json(&output)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(kind) => {
            eprintln!("error: {kind} ({})", kind.code());
            Ok(exit_code(kind))
        }
    }
}

async fn run(service: &LogvisService, command: Commands) -> Result<Value, ErrorKind> {
    debug!("event=cli_command module=cli status=start");
    let output = match command {
        Commands::Info => json!({ "data": application_info() }),
        Commands::Channels { action } => match action {
            ChannelAction::List => json!({ "data": service.list_channels().await? }),
            ChannelAction::Create => json!({ "data": service.create_channel().await? }),
            ChannelAction::Get { channel_id } => {
                json!({ "data": service.get_channel(&channel_id).await? })
            }
            ChannelAction::Delete { channel_id } => {
                service.delete_channel(&channel_id).await?;
                json!({ "data": { "channelId": channel_id } })
            }
        },
        Commands::Entries { action } => match action {
            EntryAction::List {
                channel_id,
                diagnostics,
            } => {
                let list = service.list_entries(&channel_id).await?;
                if diagnostics {
                    json!({ "data": list.entries, "elasticsearch": list.diagnostics })
                } else {
                    json!({ "data": list.entries })
                }
            }
            EntryAction::Create {
                channel_id,
                group,
                message,
                metadata,
                timestamp,
            } => {
                let entry = service
                    .create_entry(
                        &channel_id,
                        group,
                        message,
                        metadata.unwrap_or(Value::Null),
                        timestamp,
                    )
                    .await?;
                json!({ "data": entry })
            }
            EntryAction::Get {
                channel_id,
                entry_id,
            } => json!({ "data": service.get_entry(&channel_id, &entry_id).await? }),
            EntryAction::Delete {
                channel_id,
                entry_id,
            } => {
                service.delete_entry(&channel_id, &entry_id).await?;
                json!({ "data": { "channelId": channel_id, "entryId": entry_id } })
            }
        },
    };
    Ok(output)
}

fn exit_code(kind: ErrorKind) -> ExitCode {
    if kind.is_not_found() {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{run, Backend, ChannelAction, Cli, Commands, EntryAction};
    use clap::Parser;
    use logvis_core::{ErrorKind, LogvisService, Resource, StoreConfig};
    use serde_json::json;

    #[test]
    fn parses_entry_create_with_metadata() {
        let cli = Cli::try_parse_from([
            "logvis",
            "entries",
            "create",
            "c1",
            "--group",
            "db",
            "--message",
            "slow",
            "--metadata",
            r#"{"ms": 12}"#,
            "--timestamp",
            "2024-05-01T10:00:00Z",
        ])
        .unwrap();

        match cli.command {
            Commands::Entries {
                action:
                    EntryAction::Create {
                        channel_id,
                        metadata,
                        timestamp,
                        ..
                    },
            } => {
                assert_eq!(channel_id, "c1");
                assert_eq!(metadata, Some(json!({ "ms": 12 })));
                assert!(timestamp.is_some());
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn rejects_non_json_metadata() {
        let result = Cli::try_parse_from([
            "logvis", "entries", "create", "c1", "--group", "g", "--message", "m", "--metadata",
            "{oops",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn elasticsearch_flags_fill_store_config() {
        let cli = Cli::try_parse_from([
            "logvis",
            "--store",
            "elasticsearch",
            "--elastic-url",
            "https://es.local:9200",
            "--elastic-insecure",
            "--elastic-timeout-secs",
            "5",
            "channels",
            "list",
        ])
        .unwrap();

        assert_eq!(cli.store, Backend::Elasticsearch);
        match cli.store_config() {
            StoreConfig::Elasticsearch(config) => {
                assert_eq!(config.url, "https://es.local:9200");
                assert!(config.accept_invalid_certs);
                assert_eq!(config.request_timeout_secs, Some(5));
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn elasticsearch_options_fall_back_to_environment() {
        std::env::set_var("LOGVIS_ELASTIC_REFRESH", "true");
        std::env::set_var("LOGVIS_ELASTIC_TIMEOUT_SECS", "9");
        let cli = Cli::try_parse_from(["logvis", "--store", "elasticsearch", "channels", "list"]);
        std::env::remove_var("LOGVIS_ELASTIC_REFRESH");
        std::env::remove_var("LOGVIS_ELASTIC_TIMEOUT_SECS");

        match cli.unwrap().store_config() {
            StoreConfig::Elasticsearch(config) => {
                assert!(config.refresh_on_write);
                assert_eq!(config.request_timeout_secs, Some(9));
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_lists_entries_with_optional_diagnostics() {
        let service = LogvisService::from_config(&StoreConfig::default()).unwrap();
        let created = run(
            &service,
            Commands::Channels {
                action: ChannelAction::Create,
            },
        )
        .await
        .unwrap();
        let channel_id = created["data"]["channelId"].as_str().unwrap().to_string();

        let plain = run(
            &service,
            Commands::Entries {
                action: EntryAction::List {
                    channel_id: channel_id.clone(),
                    diagnostics: false,
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(plain, json!({ "data": [] }));

        let detailed = run(
            &service,
            Commands::Entries {
                action: EntryAction::List {
                    channel_id,
                    diagnostics: true,
                },
            },
        )
        .await
        .unwrap();
        assert!(detailed.get("elasticsearch").is_some());
    }

    #[tokio::test]
    async fn run_reports_missing_channel() {
        let service = LogvisService::from_config(&StoreConfig::default()).unwrap();
        let err = run(
            &service,
            Commands::Channels {
                action: ChannelAction::Get {
                    channel_id: "missing".to_string(),
                },
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err, ErrorKind::NotFound(Resource::Channel));
    }
}
