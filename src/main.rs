//! zonewalk command line interface.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zonewalk::crack::{Cracker, DEFAULT_CRACK_WORKERS};
use zonewalk::dns;
use zonewalk::error::{Result, WalkError};
use zonewalk::files::update;
use zonewalk::output::{self, Output};
use zonewalk::walk::{self, WalkConfig, Walker};

/// Tool for traversing an NSEC3-enabled DNS zone
#[derive(Debug, Parser)]
#[command(name = "zonewalk", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk the NSEC3 chain of a zone
    Walk(WalkArgs),
    /// Process CSV and hashcat files
    File(FileArgs),
    /// Crack harvested hashes with a wordlist, or hash a single name
    Crack(CrackArgs),
    /// Show the raw NS responses of the authoritative servers
    Debug(DebugArgs),
}

#[derive(Debug, Args)]
struct WalkArgs {
    /// Zone apex to walk
    #[arg(long)]
    domain: String,

    /// Comma-separated list of custom authoritative NS servers
    #[arg(long)]
    nameservers: Option<String>,

    /// Comma-separated list of generic DNS resolvers
    #[arg(long, default_value = walk::DEFAULT_RESOLVERS)]
    resolvers: String,

    /// Path and prefix for output files, e.g. ../directory/prefix
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Counters print interval in seconds
    #[arg(long, default_value_t = walk::DEFAULT_PROGRESS_SECS)]
    progress: u64,

    /// Quit after this many minutes without new hashes
    #[arg(long = "quit-after", default_value_t = walk::DEFAULT_QUIT_AFTER_MIN)]
    quit_after: u64,

    /// Quit if the zone changes mid-walk
    #[arg(long = "quit-on-change")]
    quit_on_change: bool,

    /// Workers per NS server
    #[arg(long, short = 't', default_value_t = walk::DEFAULT_THREADS_PER_NS)]
    threads: usize,

    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Args)]
struct FileArgs {
    /// Update the CSV with plaintext domains from the hashcat potfile
    #[arg(long = "update-csv")]
    update_csv: bool,

    /// Dump plaintext domains from the given files
    #[arg(long = "dump-domains")]
    dump_domains: bool,

    /// Dump cracked labels with the apex stripped
    #[arg(long = "dump-wordlist")]
    dump_wordlist: bool,

    /// A zonewalk .csv file
    #[arg(long = "file-csv")]
    file_csv: Option<PathBuf>,

    /// A hashcat .potfile containing cracked hashes
    #[arg(long = "file-hashcat")]
    file_hashcat: Option<PathBuf>,

    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Args)]
struct CrackArgs {
    /// A zonewalk .csv file to crack against
    #[arg(long = "file-csv")]
    file_csv: Option<PathBuf>,

    /// Wordlist with candidate labels
    #[arg(long = "file-wordlist")]
    file_wordlist: Option<PathBuf>,

    /// Hash a single fully qualified name instead
    #[arg(long)]
    domain: Option<String>,

    /// NSEC3 salt as hex
    #[arg(long, default_value = "")]
    salt: String,

    /// NSEC3 iteration count
    #[arg(long, default_value_t = 0)]
    iterations: u16,

    /// Number of cracking workers
    #[arg(long, default_value_t = DEFAULT_CRACK_WORKERS)]
    workers: usize,

    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Args)]
struct DebugArgs {
    /// Zone apex to inspect
    #[arg(long)]
    domain: String,

    /// Comma-separated list of custom authoritative NS servers
    #[arg(long)]
    nameservers: Option<String>,

    /// Comma-separated list of generic DNS resolvers
    #[arg(long, default_value = walk::DEFAULT_RESOLVERS)]
    resolvers: String,

    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Walk(args) => args.verbose,
        Command::File(args) => args.verbose,
        Command::Crack(args) => args.verbose,
        Command::Debug(args) => args.verbose,
    };
    init_tracing(verbose);

    if let Err(err) = run(cli).await {
        tracing::error!("{err}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Walk(args) => run_walk(args).await,
        Command::File(args) => run_file(args),
        Command::Crack(args) => run_crack(args),
        Command::Debug(args) => run_debug(args).await,
    }
}

async fn run_walk(args: WalkArgs) -> Result<()> {
    must_be_positive(args.progress, "progress")?;
    must_be_positive(args.quit_after, "quit-after")?;
    must_be_positive(args.threads as u64, "threads")?;

    let output = build_output(args.output.as_deref(), &args.domain, args.verbose)?;

    let config = WalkConfig {
        domain: args.domain,
        nameservers: args
            .nameservers
            .map(|list| dns::parse_server_list(&list))
            .unwrap_or_default(),
        resolvers: dns::parse_server_list(&args.resolvers),
        progress_secs: args.progress,
        quit_after_min: args.quit_after,
        quit_on_change: args.quit_on_change,
        threads_per_ns: args.threads,
        verbose: args.verbose,
        ..WalkConfig::default()
    };

    Walker::new(config, output).run().await
}

fn run_file(args: FileArgs) -> Result<()> {
    let actions = [args.update_csv, args.dump_domains, args.dump_wordlist];
    if actions.iter().filter(|&&action| action).count() != 1 {
        return Err(WalkError::config(
            "specify exactly one of --update-csv, --dump-domains or --dump-wordlist",
        ));
    }

    let output = Arc::new(Output::new(args.verbose));

    if args.update_csv {
        let (Some(csv), Some(potfile)) = (&args.file_csv, &args.file_hashcat) else {
            return Err(WalkError::config(
                "--update-csv needs both --file-csv and --file-hashcat",
            ));
        };
        update::update_csv(csv, potfile, &output)?;
        return Ok(());
    }

    if args.file_csv.is_none() && args.file_hashcat.is_none() {
        return Err(WalkError::config(
            "specify --file-csv and/or --file-hashcat",
        ));
    }

    if args.dump_domains {
        update::dump_domains(
            args.file_csv.as_deref(),
            args.file_hashcat.as_deref(),
            &output,
        )
    } else {
        update::dump_wordlist(
            args.file_csv.as_deref(),
            args.file_hashcat.as_deref(),
            &output,
        )
    }
}

fn run_crack(args: CrackArgs) -> Result<()> {
    let output = Arc::new(Output::new(args.verbose));
    let cracker = Cracker::new(output.clone()).with_workers(args.workers);

    match (&args.file_csv, &args.file_wordlist, &args.domain) {
        (Some(csv), Some(wordlist), _) => {
            cracker.run_wordlist(csv, wordlist)?;
            Ok(())
        }
        (_, _, Some(domain)) => cracker.run_single(domain, &args.salt, args.iterations),
        _ => Err(WalkError::config(
            "either --file-csv with --file-wordlist, or --domain must be specified",
        )),
    }
}

async fn run_debug(args: DebugArgs) -> Result<()> {
    let output = Arc::new(Output::new(args.verbose));

    let config = WalkConfig {
        domain: args.domain,
        nameservers: args
            .nameservers
            .map(|list| dns::parse_server_list(&list))
            .unwrap_or_default(),
        resolvers: dns::parse_server_list(&args.resolvers),
        verbose: args.verbose,
        ..WalkConfig::default()
    };

    Walker::new(config, output).run_debug().await
}

fn build_output(prefix: Option<&str>, domain: &str, verbose: bool) -> Result<Arc<Output>> {
    let output = match prefix {
        Some(path) => {
            let prefix = output::output_file_prefix(path, domain)?;
            let output = Output::with_prefix(&prefix, verbose)?;
            output.log(&format!("logging into {prefix}.[log,csv,hash]"));
            output
        }
        None => Output::new(verbose),
    };

    Ok(Arc::new(output))
}

fn must_be_positive(value: u64, name: &str) -> Result<()> {
    if value == 0 {
        return Err(WalkError::config(format!(
            "--{name} must be a positive number"
        )));
    }
    Ok(())
}
