//! CLI posdata
//!
//! Утилита для просмотра архивов и файлов «ключ/значение», а также для
//! приёма и отправки записей через сокет.

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use posdata::{
    engine::archive::Entry,
    network::{serve_sidecar, OrderCollector, ServerConfig},
    FieldValue, KeyValueReader, KeyValueWriter, RecordReader, SidecarOptions, StackError,
    Terminator,
};
use serde_json::json;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::debug;

/// Аргументы командной строки
#[derive(Parser)]
#[command(name = "posdata-cli")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ", built ", env!("BUILD_TIME"), ")"))]
#[command(about = "Inspect POS data archives and key/value files", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Включить подробный вывод (debug)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Формат вывода
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Показать заголовок и поля архива
    #[command(alias = "i")]
    Inspect {
        path: PathBuf,
        /// Сколько полей показать (0 — все)
        #[arg(short = 'n', long, default_value = "0")]
        limit: usize,
    },
    /// Вывести записи файла «ключ/значение»
    Kv {
        path: PathBuf,
        #[arg(short, long, default_value = ":")]
        delimiter: char,
        #[arg(long, default_value = "256")]
        max_len: usize,
    },
    /// Принимать удалённые заказы на адресе
    Listen {
        #[arg(default_value = "127.0.0.1:7070", env = "POSDATA_LISTEN")]
        addr: String,
    },
    /// Отправить пары `key=value` в сокет
    Send {
        addr: String,
        #[arg(required = true)]
        pairs: Vec<String>,
        /// Завершить сессию записью `done`
        #[arg(long)]
        done: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {e}");
    }

    if let Err(e) = handle_command(&cli).await {
        eprintln!("{}", render_error(&e, cli.output));
        std::process::exit(exit_code(&e));
    }
}

/// Текст ошибки для stderr. В режиме `json` ошибки архива и протокола
/// выводятся объектом с кодом статуса.
fn render_error(
    e: &anyhow::Error,
    output: OutputFormat,
) -> String {
    match (output, e.downcast_ref::<StackError>()) {
        (OutputFormat::Json, Some(stack)) => serde_json::to_string(&stack.to_response())
            .unwrap_or_else(|_| format!("Error: {e:#}")),
        _ => format!("Error: {e:#}"),
    }
}

/// Повреждённые данные и нехватка места дают код 2, остальное 1.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<StackError>() {
        Some(stack) if stack.is_critical() => 2,
        _ => 1,
    }
}

async fn handle_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Inspect { path, limit } => inspect(path, *limit, cli.output),
        Commands::Kv {
            path,
            delimiter,
            max_len,
        } => dump_kv(path, *delimiter, *max_len, cli.output),
        Commands::Listen { addr } => listen(addr).await,
        Commands::Send { addr, pairs, done } => send(addr, pairs, *done),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { "warn" };
    fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

fn value_json(value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Int(c) if c.is_signed() => json!(c.as_i64()),
        FieldValue::Int(c) => json!(c.as_u64()),
        FieldValue::Float(f) => json!(f),
        FieldValue::Str(s) => json!(s),
        FieldValue::Time(t) => match t.epoch_secs() {
            Some(secs) => json!(secs),
            None => serde_json::Value::Null,
        },
    }
}

fn inspect(
    path: &PathBuf,
    limit: usize,
    output: OutputFormat,
) -> Result<()> {
    let mut reader =
        RecordReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let revision = reader.revision().map(|r| r as u8);

    if output == OutputFormat::Pretty {
        println!("file:      {}", path.display());
        println!("framing:   {}", reader.framing());
        if let Some(rev) = revision {
            println!("revision:  {rev}");
        }
        println!("version:   {}", reader.version());
    }

    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut shown = 0usize;
    while limit == 0 || shown < limit {
        let entry = match reader.next_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                eprintln!("stopped at offset {}: {e}", reader.offset());
                break;
            }
        };
        shown += 1;
        match entry {
            Entry::RecordBegin => {
                if output == OutputFormat::Pretty {
                    println!("{:indent$}{{", "", indent = depth * 2);
                }
                depth += 1;
            }
            Entry::RecordEnd => {
                depth = depth.saturating_sub(1);
                if output == OutputFormat::Pretty {
                    println!("{:indent$}}}", "", indent = depth * 2);
                }
            }
            Entry::Value(value) => match output {
                OutputFormat::Pretty => println!(
                    "{:indent$}{:<6} {value}",
                    "",
                    value.kind().name(),
                    indent = depth * 2
                ),
                OutputFormat::Json => fields.push(json!({
                    "kind": value.kind().name(),
                    "depth": depth,
                    "value": value_json(&value),
                })),
            },
        }
    }

    if output == OutputFormat::Json {
        let doc = json!({
            "file": path.display().to_string(),
            "framing": reader.framing().name(),
            "revision": revision,
            "version": reader.version(),
            "fields": fields,
            "truncated": reader.end_of_stream(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    debug!(
        fields = reader.fields_read(),
        offset = reader.offset(),
        "Inspection finished"
    );
    Ok(())
}

fn dump_kv(
    path: &PathBuf,
    delimiter: char,
    max_len: usize,
    output: OutputFormat,
) -> Result<()> {
    let options = SidecarOptions::default()
        .with_delimiter(delimiter)
        .with_max_len(max_len);
    let reader = KeyValueReader::open(path, options)?;
    let mut pairs = Vec::new();
    for record in reader {
        let record = record?;
        match output {
            OutputFormat::Pretty => println!("{} = {}", record.key, record.value),
            OutputFormat::Json => pairs.push(json!([record.key, record.value])),
        }
    }
    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
    }
    Ok(())
}

async fn listen(addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    println!("listening on {}", listener.local_addr()?);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let server = tokio::spawn(serve_sidecar(
        listener,
        ServerConfig::default(),
        move |_| OrderCollector::new(tx.clone()),
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            order = rx.recv() => match order {
                Some(order) => {
                    println!("order {} ({} items, total {})", order.id, order.items.len(), order.total());
                    for item in &order.items {
                        println!("  {} x{} @ {}", item.name, item.quantity, item.price);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    shutdown.notify_one();
    server.await??;
    Ok(())
}

fn send(
    addr: &str,
    pairs: &[String],
    done: bool,
) -> Result<()> {
    let stream =
        std::net::TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?;
    let mut writer = KeyValueWriter::from_stream(stream)?;
    debug_assert_eq!(writer.terminator(), Terminator::Nul);
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected key=value, got {pair:?}");
        };
        writer.write(key, value)?;
    }
    if done {
        writer.write("done", "")?;
    }
    writer.close()?;
    Ok(())
}
