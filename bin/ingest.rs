use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;
use voter_ingest::{BatchKey, Config, Ingestor, LogFormat, LoggingConfig, VoterStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("voter-ingest")
        .about("Ingest a voter registration extract into the archive and latest tables")
        .arg(Arg::new("path").long("path").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("period").long("period").required(true).help("Batch period, e.g. the extract year").value_parser(clap::value_parser!(i64)))
        .arg(Arg::new("sequence").long("sequence").required(true).help("Batch sequence within the period").value_parser(clap::value_parser!(i64)))
        .arg(Arg::new("config").long("config").help("TOML configuration file").value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("database").long("database").help("sqlite:// URL; overrides store.database_url"))
        .arg(Arg::new("batch-size").long("batch-size").help("Records per flush; overrides ingest.batch_size").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("charset").long("charset").help("Extract charset label; overrides ingest.charset"))
        .arg(Arg::new("json").long("json").help("Print the run statistics as JSON").action(ArgAction::SetTrue))
        .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::Count))
        .get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(url) = matches.get_one::<String>("database") {
        config.store.database_url = url.clone();
    }
    if let Some(size) = matches.get_one::<usize>("batch-size") {
        config.ingest.batch_size = *size;
    }
    if let Some(charset) = matches.get_one::<String>("charset") {
        config.ingest.charset = charset.clone();
    }
    config.validate()?;
    init_logging(&config.logging, matches.get_count("verbose"))?;

    let path = matches
        .get_one::<PathBuf>("path")
        .context("--path is required")?;
    let batch = BatchKey::new(
        *matches.get_one::<i64>("period").context("--period is required")?,
        *matches.get_one::<i64>("sequence").context("--sequence is required")?,
    );

    let store = VoterStore::connect(&config.store.database_url, config.store.max_connections)
        .await
        .with_context(|| format!("failed to open {}", config.store.database_url))?;
    store.init_schema().await.context("failed to create tables")?;
    let ingestor = Ingestor::new(store, &config.ingest)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling ingest");
                cancel.cancel();
            }
        });
    }

    let start = Instant::now();
    let stats = match ingestor.run_path(path, batch, &cancel).await {
        Ok(stats) => stats,
        Err(err) => {
            error!(
                rows = err.stats.rows_processed,
                created = err.stats.rows_created,
                updated = err.stats.rows_updated,
                "{err}"
            );
            return Err(err.into());
        }
    };
    let elapsed = start.elapsed().as_secs_f64();

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let rps = (stats.rows_processed as f64) / elapsed.max(f64::EPSILON);
    println!(
        "source={} batch={} rows={} created={} updated={} stale={} categories_updated={}\nelapsed={:.1}s rows/sec={:.0}",
        path.display(),
        batch,
        stats.rows_processed,
        stats.rows_created,
        stats.rows_updated,
        stats.rows_stale,
        stats.categories_updated,
        elapsed,
        rps
    );
    if let Some(lists) = ingestor.store().category_snapshot().await? {
        let counts: Vec<String> = lists
            .iter()
            .map(|(field, values)| format!("{field}={}", values.len()))
            .collect();
        println!("categories {}", counts.join(" "));
    }
    Ok(())
}

fn init_logging(config: &LoggingConfig, verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::from(config.level),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}
