use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use kestrel_client::{ClientConfig, KestrelAsyncClient, StatsSnapshot};
use kestrel_core::QueueStats;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "kq-admin")]
#[command(about = "Kestrel queue admin CLI", long_about = None)]
struct Args {
    /// Kestrel servers (host:port, comma separated)
    #[arg(short, long, env = "KESTREL_SERVERS", value_delimiter = ',')]
    servers: Vec<String>,

    /// YAML client configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json, table, yaml)
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enqueue a message
    Put {
        queue: String,
        message: String,

        /// Expire the message after this many seconds
        #[arg(short, long)]
        expire: Option<u64>,
    },

    /// Dequeue one message
    Get {
        queue: String,

        /// Wait up to this many milliseconds for a message
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Show the head of a queue without removing it
    Peek {
        queue: String,

        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Reliable read: fetch, print, then finish (or abort)
    Next {
        queue: String,

        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Hand the message back instead of acknowledging it
        #[arg(long)]
        abort: bool,
    },

    /// Delete a queue
    Delete { queue: String },

    /// Empty a queue on every server
    Flush { queue: String },

    /// Empty every queue on every server
    FlushAll,

    /// Reload server configuration
    Reload,

    /// Show server and queue statistics
    Stats {
        /// Print the server's text output unparsed
        #[arg(long)]
        raw: bool,

        /// With --raw, print DUMP_STATS instead of STATS
        #[arg(long)]
        dump: bool,
    },

    /// Show server versions
    Version,

    /// Shut every server down
    Shutdown,
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    if !args.servers.is_empty() {
        config = config.with_servers(args.servers.iter().cloned());
    }

    Ok(config)
}

fn emit(format: &str, value: serde_json::Value, table: impl FnOnce() -> Table) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&value)?),
        "yaml" => print!("{}", serde_yaml::to_string(&value)?),
        _ => println!("{}", table()),
    }
    Ok(())
}

fn field_table(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value.clone()]);
    }
    table
}

fn message_output(format: &str, queue: &str, message: Option<String>) -> anyhow::Result<()> {
    let shown = message.clone().unwrap_or_else(|| "(empty)".to_string());
    emit(format, json!({ "queue": queue, "message": message }), || {
        field_table(&[("Queue", queue.to_string()), ("Message", shown)])
    })
}

fn status_output(format: &str, command: &str, ok: bool) -> anyhow::Result<()> {
    emit(format, json!({ "command": command, "ok": ok }), || {
        field_table(&[("Command", command.to_string()), ("Ok", ok.to_string())])
    })
}

fn queue_table(stats: &StatsSnapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);

    let columns: BTreeSet<&str> = stats
        .queues
        .values()
        .flat_map(QueueStats::keys)
        .map(String::as_str)
        .collect();

    let mut header = vec!["Queue"];
    header.extend(columns.iter().copied());
    table.set_header(header);

    for (name, counters) in &stats.queues {
        let mut row = vec![name.clone()];
        row.extend(columns.iter().map(|c| {
            counters
                .get(*c)
                .map(ToString::to_string)
                .unwrap_or_default()
        }));
        table.add_row(row);
    }
    table
}

fn server_table(stats: &StatsSnapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Stat", "Value"]);
    for (name, value) in &stats.server {
        table.add_row(vec![name.clone(), value.to_string()]);
    }
    table
}

fn timeout(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = load_config(&args)?;
    tracing::debug!("Using config: {:?}", config);
    let mut client = KestrelAsyncClient::from_config(&config)?;
    let format = args.format.as_str();

    match args.command {
        Commands::Put { queue, message, expire } => {
            let stored = client
                .put(&queue, &message, expire.map(Duration::from_secs))
                .await?;
            status_output(format, "put", stored)?;
        }

        Commands::Get { queue, timeout_ms } => {
            let message = client.get(&queue, timeout(timeout_ms)).await?;
            message_output(format, &queue, message)?;
        }

        Commands::Peek { queue, timeout_ms } => {
            let message = client.peek(&queue, timeout(timeout_ms)).await?;
            message_output(format, &queue, message)?;
        }

        Commands::Next { queue, timeout_ms, abort } => {
            let message = client.next(&queue, timeout(timeout_ms)).await?;
            if message.is_some() {
                if abort {
                    client.abort(&queue).await?;
                } else {
                    client.finish(&queue).await?;
                }
            }
            message_output(format, &queue, message)?;
        }

        Commands::Delete { queue } => {
            let deleted = client.delete(&queue).await?;
            status_output(format, "delete", deleted)?;
        }

        Commands::Flush { queue } => {
            let ok = client.flush(&queue).await?;
            status_output(format, "flush", ok)?;
        }

        Commands::FlushAll => {
            let ok = client.flush_all().await?;
            status_output(format, "flush_all", ok)?;
        }

        Commands::Reload => {
            let ok = client.reload().await?;
            status_output(format, "reload", ok)?;
        }

        Commands::Stats { raw: true, dump } => {
            println!("{}", client.raw_stats(dump).await?);
        }

        Commands::Stats { raw: false, .. } => {
            let stats = client.stats().await?;
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
                "yaml" => print!("{}", serde_yaml::to_string(&stats)?),
                _ => {
                    println!("{}", server_table(&stats));
                    if !stats.queues.is_empty() {
                        println!("{}", queue_table(&stats));
                    }
                }
            }
        }

        Commands::Version => {
            let versions = client.version().await?;
            let lines: Vec<&str> = versions.lines().collect();
            emit(format, json!({ "versions": lines }), || {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Server", "Version"]);
                for (i, version) in lines.iter().enumerate() {
                    table.add_row(vec![(i + 1).to_string(), version.to_string()]);
                }
                table
            })?;
        }

        Commands::Shutdown => {
            client.shutdown().await?;
            eprintln!("Shutdown sent");
        }
    }

    client.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_servers_flag_overrides_config() {
        let args = Args::parse_from(["kq-admin", "--servers", "a:1,b:2", "flush-all"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.servers, vec!["a:1", "b:2"]);
    }

    #[test]
    fn test_next_flags() {
        let args = Args::parse_from(["kq-admin", "next", "jobs", "--abort", "-t", "250"]);
        match args.command {
            Commands::Next { queue, timeout_ms, abort } => {
                assert_eq!(queue, "jobs");
                assert_eq!(timeout_ms, Some(250));
                assert!(abort);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_stats_table_columns() {
        let mut stats = StatsSnapshot::default();
        stats.queues.insert(
            "jobs".to_string(),
            QueueStats::from([("items".to_string(), 3), ("bytes".to_string(), 9)]),
        );
        let rendered = queue_table(&stats).to_string();
        assert!(rendered.contains("jobs"));
        assert!(rendered.contains("items"));
    }
}
