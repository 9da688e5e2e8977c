//! CLI entry point for `mailsweep`.

use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsweep::agent;
use mailsweep::analyzer;
use mailsweep::config::{self, Config, Paths};
use mailsweep::directive;
use mailsweep::printer::LprPrinter;
use mailsweep::store::memory::CategorizationMemory;
use mailsweep::store::unhandled::UnhandledLog;
use mailsweep::summarizer::openai::OpenAiSummarizer;

#[derive(Parser)]
#[command(name = "mailsweep", version, about = "Personal mailbox attachment agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full cycle (download, analyze, process directives)
    Run,
    /// Run cycles on an interval, writing a heartbeat between runs
    Watch,
    /// Download new attachments only
    Download,
    /// Fetch message bodies for an ad-hoc query
    Fetch {
        query: String,
        #[arg(long, default_value = "100")]
        page_size: u32,
    },
    /// Analyze downloaded files and fetched messages
    Analyze,
    /// Act on print directives in the categorization memory
    Process {
        /// Printer name (defaults to the configured or system printer)
        #[arg(short, long)]
        printer: Option<String>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();
    let paths = Paths::from_config(&config);

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &paths);

    match cli.command {
        Commands::Run => cmd_run(&config, &paths),
        Commands::Watch => cmd_watch(&config, &paths),
        Commands::Download => cmd_download(&config, &paths),
        Commands::Fetch { query, page_size } => cmd_fetch(&paths, &query, page_size),
        Commands::Analyze => cmd_analyze(&config, &paths),
        Commands::Process { printer } => cmd_process(&config, &paths, printer),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and a log file in the data directory.
fn setup_logging(level: &str, paths: &Paths) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if std::fs::create_dir_all(&paths.logs).is_ok() {
        let file_appender = tracing_appender::rolling::never(&paths.logs, "mailsweep.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn build_printer(config: &Config, override_name: Option<String>) -> LprPrinter {
    LprPrinter::new(
        override_name.or_else(|| config.print.printer.clone()),
        config.print.supported_suffixes.clone(),
    )
}

/// Run one full cycle and print the report.
fn cmd_run(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    agent::startup_checks(paths)?;
    let session = agent::connect_session(paths)?;
    let summarizer = OpenAiSummarizer::from_env(&config.summarizer)?;
    let printer = build_printer(config, None);

    let start = Instant::now();
    let report = agent::run_cycle(config, paths, &session, &summarizer, &printer)?;
    let elapsed = start.elapsed();

    println!();
    println!("  Cycle complete in {elapsed:.2?}");
    println!("  {:<25} {}", "New attachments", report.retrieval.downloaded.len());
    println!("  {:<25} {}", "Duplicates skipped", report.retrieval.duplicates_skipped);
    println!("  {:<25} {}", "Files analyzed", report.analysis.files_analyzed);
    println!("  {:<25} {}", "Unhandled recorded", report.analysis.unhandled_recorded);
    println!("  {:<25} {}", "Files printed", report.directives.files_printed);
    println!("  {:<25} {}", "Files archived", report.directives.archived);
    println!(
        "  {:<25} {}",
        "Errors",
        report.retrieval.failures + report.directives.errors
    );
    println!();

    Ok(())
}

/// Run the supervised interval loop; never returns.
fn cmd_watch(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    paths.ensure_directories()?;
    let printer = build_printer(config, None);
    agent::run_loop(config, paths, &printer)
}

/// Download new attachments with a progress bar and a size summary.
fn cmd_download(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    paths.ensure_directories()?;
    let session = agent::connect_session(paths)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Downloading [{pos} messages examined]")
            .expect("valid template"),
    );

    let start = Instant::now();
    let progress = |examined: usize| pb.set_position(examined as u64);
    let outcome = agent::run_retrieval(config, paths, &session, Some(&progress))?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    use humansize::{format_size, BINARY};
    println!();
    println!("  Download complete in {elapsed:.2?}");
    println!("  {:<25} {}", "Messages examined", outcome.messages_examined);
    println!("  {:<25} {}", "Already seen", outcome.messages_skipped);
    println!("  {:<25} {}", "New attachments", outcome.downloaded.len());
    println!("  {:<25} {}", "Duplicates skipped", outcome.duplicates_skipped);
    println!(
        "  {:<25} {}",
        "Bytes written",
        format_size(outcome.bytes_written, BINARY)
    );
    if outcome.failures > 0 {
        println!("  {:<25} {}", "Failures", outcome.failures);
    }
    println!();

    Ok(())
}

/// Fetch message bodies for a query and record them for analysis.
fn cmd_fetch(paths: &Paths, query: &str, page_size: u32) -> anyhow::Result<()> {
    paths.ensure_directories()?;
    let session = agent::connect_session(paths)?;

    let saved = agent::run_fetch(paths, &session, query, page_size)?;
    println!("  Fetched {saved} new message(s) for query '{query}'");
    Ok(())
}

/// Analyze pending downloads and fetched messages.
fn cmd_analyze(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    paths.ensure_directories()?;
    let summarizer = OpenAiSummarizer::from_env(&config.summarizer)?;

    let mut memory = CategorizationMemory::load(&paths.memory_file);
    let mut unhandled = UnhandledLog::load(&paths.unhandled_file);

    let result = analyzer::run_analysis(&summarizer, paths, &mut memory, &mut unhandled);
    let pruned = unhandled.prune_handled(&memory);
    memory.save(&paths.memory_file)?;
    unhandled.save(&paths.unhandled_file)?;
    let outcome = result?;

    println!();
    println!("  {:<25} {}", "Files analyzed", outcome.files_analyzed);
    println!("  {:<25} {}", "Messages analyzed", outcome.messages_analyzed);
    println!("  {:<25} {}", "Already analyzed", outcome.already_analyzed);
    println!("  {:<25} {}", "Unhandled recorded", outcome.unhandled_recorded);
    println!("  {:<25} {}", "Unhandled pruned", pruned);
    println!();

    Ok(())
}

/// Act on directives without downloading or analyzing.
fn cmd_process(config: &Config, paths: &Paths, printer_name: Option<String>) -> anyhow::Result<()> {
    paths.ensure_directories()?;
    let printer = build_printer(config, printer_name);
    let memory = CategorizationMemory::load(&paths.memory_file);

    let stats = directive::process_directives(
        &memory,
        &paths.downloads,
        &paths.archive,
        &printer,
        &config.print.directive,
    );

    println!();
    println!("  {:<25} {}", "Entries examined", stats.total_entries);
    println!("  {:<25} {}", "Directives matched", stats.matched_entries);
    println!("  {:<25} {}", "Files found", stats.files_found);
    println!("  {:<25} {}", "Files printed", stats.files_printed);
    println!("  {:<25} {}", "Files archived", stats.archived);
    println!("  {:<25} {}", "Errors", stats.errors);
    println!();

    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsweep", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
