use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use dictsearch::{
    ConfigOverrides, DictionaryDir, EncodingMode, SearchConfig, SearchCoordinator, SearchError,
    SearchOutput, SearchStatus, SkipReason, SourceLoader, SourceSelection,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, SearchError>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file, layered over ./.dictsearch.yaml and the global config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliSearchArgs {
    /// Word to look up; matched against the first word of each entry
    query: String,

    /// Directory holding the dictionaries
    #[arg(short = 'd', long)]
    dir: Option<PathBuf>,

    /// Dictionary to search (glob patterns allowed, can be given multiple times)
    #[arg(short = 's', long = "source")]
    sources: Vec<String>,

    /// Search every dictionary in the directory
    #[arg(long, conflicts_with = "sources")]
    all: bool,

    /// Number of threads to use
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Give up after this long (e.g. 500ms, 5s)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Maximum number of undelivered matches before scanners wait
    #[arg(long)]
    sink_capacity: Option<usize>,

    /// How to handle invalid UTF-8 sequences
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EncodingArg {
    /// Report the dictionary as unreadable
    #[value(name = "failfast")]
    FailFast,
    /// Replace invalid sequences and keep going
    Lossy,
}

impl From<EncodingArg> for EncodingMode {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::FailFast => EncodingMode::FailFast,
            EncodingArg::Lossy => EncodingMode::Lossy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search dictionaries for entries starting with a word
    Search(Box<CliSearchArgs>),

    /// List available dictionaries
    List {
        /// Directory holding the dictionaries
        #[arg(short = 'd', long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let file_config = SearchConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::List { dir } => {
            let config = file_config.merge_with_cli(ConfigOverrides {
                dictionary_dir: dir,
                log_level: cli.log_level,
                ..ConfigOverrides::default()
            });
            init_tracing(&config.log_level);

            let dicts = DictionaryDir::from_config(&config);
            let ids = dicts.list()?;
            if ids.is_empty() {
                eprintln!("No dictionaries found in {}", dicts.root().display());
            }
            for id in ids {
                println!("{}", id);
            }
            Ok(())
        }
        Commands::Search(args) => {
            let config = file_config.merge_with_cli(ConfigOverrides {
                dictionary_dir: args.dir,
                thread_count: args.threads,
                max_search_duration: args.timeout,
                sink_capacity: args.sink_capacity,
                encoding_mode: args.encoding.map(EncodingMode::from),
                log_level: cli.log_level,
            });
            init_tracing(&config.log_level);
            debug!("Effective configuration: {:?}", config);

            let dicts = DictionaryDir::from_config(&config);
            let selection = if args.all {
                dicts.list()?.into_iter().collect()
            } else if args.sources.is_empty() {
                SourceSelection::new()
            } else {
                SourceSelection::from_patterns(&dicts.list()?, &args.sources)?
            };

            let coordinator = SearchCoordinator::new(config)?;
            let output = coordinator.run_selection(&args.query, &selection, Arc::new(dicts));

            if args.json {
                let json = serde_json::to_string_pretty(&output).map_err(std::io::Error::from)?;
                println!("{}", json);
            } else {
                print_search_output(&output);
            }
            print_failures(&output);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_search_output(output: &SearchOutput) {
    match output.status {
        SearchStatus::Skipped(SkipReason::EmptyQuery) => {
            println!("Nothing to search for: the query is empty");
            return;
        }
        SearchStatus::Skipped(SkipReason::NoSourcesSelected) => {
            println!("No dictionaries selected (use -s NAME or --all)");
            return;
        }
        _ => {}
    }

    // Sources interleave in arrival order; group them back together
    let mut by_source: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for record in &output.records {
        by_source
            .entry(record.source_id.as_str())
            .or_default()
            .push(record.line.as_str());
    }

    for (i, (source_id, lines)) in by_source.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", format!("{}:", source_id).blue());
        for line in lines {
            println!("{}", line);
        }
    }

    if !by_source.is_empty() {
        println!();
    }
    println!(
        "Found {} matches in {} dictionaries",
        output.len(),
        by_source.len()
    );

    match output.status {
        SearchStatus::Cancelled => {
            println!("{}", "Search was cancelled; results are partial".yellow())
        }
        SearchStatus::TimedOut(limit) => println!(
            "{}",
            format!(
                "Search timed out after {}; results are partial",
                humantime::format_duration(limit)
            )
            .yellow()
        ),
        _ => {}
    }
}

fn print_failures(output: &SearchOutput) {
    for failure in &output.failures {
        eprintln!(
            "{} {}: {}",
            "warning:".yellow(),
            failure.source_id,
            failure.reason
        );
    }
}
