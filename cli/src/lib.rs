use anyhow::{Error, Result};
use clap::{Parser, Subcommand};
use ldes_fragmenter::batch::{fragment_dataset, BatchOptions, BATCH_PAGE_CAPACITY};
use ldes_fragmenter::config::{DEFAULT_BASE_IRI, DEFAULT_CACHE_SIZE};
use ldes_fragmenter::service::{IngestRequest, PageRequest};
use ldes_fragmenter::transform::DatasetConfiguration;
use ldes_fragmenter::util::{format_for_path, init_logging};
use ldes_fragmenter::{Engine, EngineConfig, PageId, PageReader};
use log::info;
use serde_json::json;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ldes-fragmenter")]
#[command(about = "Fragments RDF resources into a Linked Data Event Stream")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a fragmented version of a dataset file
    Fragment {
        /// The dataset which should be fragmented
        dataset_file: PathBuf,
        /// JSON configuration file which describes how the dataset should be parsed
        #[clap(long, short)]
        config: PathBuf,
        /// The destination folder in which the fragmented dataset should be stored
        #[clap(long, short)]
        output: PathBuf,
        /// The maximum size of the node cache
        #[clap(long, default_value_t = DEFAULT_CACHE_SIZE)]
        cache_size: usize,
        /// The fragmenter which is to be used
        #[clap(long, short, default_value = "time-fragmenter")]
        fragmenter: String,
        /// The predicate on which the relations should be defined
        #[clap(long, short = 'p')]
        relation_path: Option<String>,
        /// The dataset transformer which should be applied, overrides the configuration file
        #[clap(long, short)]
        transformer: Option<String>,
        /// Maximum number of members per page
        #[clap(long, default_value_t = BATCH_PAGE_CAPACITY)]
        page_capacity: usize,
        /// Prefix of the page IRIs; the output folder name is appended
        #[clap(long, default_value = DEFAULT_BASE_IRI)]
        base_iri: String,
    },
    /// Add a single resource to a stream folder under DATA_FOLDER
    Ingest {
        /// Stream folder, relative to DATA_FOLDER
        #[clap(long)]
        folder: String,
        /// IRI of the resource described by the body
        #[clap(long)]
        resource: String,
        /// IRI of the event stream
        #[clap(long)]
        stream: String,
        #[clap(long)]
        relation_path: Option<String>,
        #[clap(long)]
        fragmenter: Option<String>,
        /// Media type of the body, guessed from the file extension when omitted
        #[clap(long)]
        content_type: Option<String>,
        /// File holding the RDF description of the resource
        body_file: PathBuf,
    },
    /// Print a stored page
    Page {
        folder: String,
        /// Page identifier, e.g. `3` or `a/b/0`
        page_id: String,
        /// Output media type, Turtle by default
        #[clap(long)]
        accept: Option<String>,
    },
    /// Print the number of the last page of a stream folder
    LastPage { folder: String },
    /// Print the number of members in the last page of a stream folder
    Count { folder: String },
    /// Print the effective configuration as JSON
    Config,
}

pub fn run() -> Result<()> {
    init_logging();
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    init_logging();
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn execute(cmd: Cli) -> Result<()> {
    // The RUST_LOG env var is set by `init_logging` if LDES_LOG is present.
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    match cmd.command {
        Commands::Fragment {
            dataset_file,
            config,
            output,
            cache_size,
            fragmenter,
            relation_path,
            transformer,
            page_capacity,
            base_iri,
        } => {
            let dataset_config = DatasetConfiguration::from_file(&config)?;
            let mut options = BatchOptions::new(dataset_file, dataset_config, output);
            options.fragmenter = fragmenter.parse()?;
            options.transformer = transformer.map(|t| t.parse()).transpose()?;
            options.relation_path = relation_path;
            options.cache_size = cache_size;
            options.page_capacity = page_capacity;
            options.base_iri = base_iri;
            let stats = fragment_dataset(&options)?;
            println!(
                "Fragmented {} resources into {} ({} failed)",
                stats.ingested,
                options.output.display(),
                stats.failed
            );
        }
        Commands::Ingest {
            folder,
            resource,
            stream,
            relation_path,
            fragmenter,
            content_type,
            body_file,
        } => {
            let body = std::fs::read(&body_file)?;
            let content_type = content_type
                .unwrap_or_else(|| format_for_path(&body_file).media_type().to_string());
            let engine = open_engine(cmd.verbose || cmd.debug)?;
            let response = engine.ingest(IngestRequest {
                folder,
                resource,
                stream,
                relation_path,
                fragmenter,
                content_type,
                body,
            })?;
            println!("{}", serde_json::to_string(&response)?);
            engine.shutdown()?;
        }
        Commands::Page {
            folder,
            page_id,
            accept,
        } => {
            let page: PageId = page_id.parse()?;
            let reader = open_reader(cmd.verbose || cmd.debug)?;
            let response = reader.retrieve_page(&PageRequest {
                folder,
                page,
                accept,
            })?;
            info!(
                "Page {} ({}) is {}",
                page_id,
                response.content_type,
                if response.cacheable {
                    "immutable"
                } else {
                    "still open"
                }
            );
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
        }
        Commands::LastPage { folder } => {
            let reader = open_reader(cmd.verbose || cmd.debug)?;
            println!("{}", json!({ "lastPage": reader.last_page(&folder)? }));
        }
        Commands::Count { folder } => {
            let reader = open_reader(cmd.verbose || cmd.debug)?;
            println!("{}", json!({ "count": reader.count(&folder)? }));
        }
        Commands::Config => {
            let config = EngineConfig::from_env()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn open_engine(verbose: bool) -> Result<Engine> {
    let config = EngineConfig::from_env()?;
    if verbose {
        config.print();
    }
    Ok(Engine::new(config)?)
}

/// Read-only commands take no lock, so they work while a writer is running.
fn open_reader(verbose: bool) -> Result<PageReader> {
    let config = EngineConfig::from_env()?;
    if verbose {
        config.print();
    }
    Ok(PageReader::from_config(&config))
}
