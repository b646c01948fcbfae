// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use subtrans::app_config::{self, Config, API_KEY_VARIABLES};
use subtrans::file_utils::FileManager;
use subtrans::providers::gemini::Gemini;
use subtrans::translation::{
    AdmissionConfig, AdmissionController, Orchestrator, PromptTemplate, RateLimitedClient, Reconciler,
    ReconcilerConfig, RetryBudget,
};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate subtitle files (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for subtrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// Subtitle files, or a single directory to search for .srt/.ass files
    #[arg(value_name = "INPUT_PATH")]
    inputs: Vec<PathBuf>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language (e.g., 'Japanese', 'en')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language (e.g., 'Italian', 'it')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Append failures and misalignments of the run to this file
    #[arg(long, value_name = "FILE")]
    issues_log: Option<PathBuf>,
}

/// subtrans - Subtitle translation under provider quotas
///
/// Translates SRT and ASS subtitles with Gemini, keeping within the
/// configured requests-per-minute, tokens-per-minute and concurrency limits.
#[derive(Parser, Debug)]
#[command(name = "subtrans")]
#[command(version)]
#[command(about = "Rate-limited AI subtitle translation tool")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "subtrans translates SRT and ASS subtitles with a structured-output LLM.

EXAMPLES:
    subtrans episode01.ass                      # Translate using default config
    subtrans /series/season1/                   # Translate every subtitle in a directory
    subtrans -s Japanese -t Italian ep01.srt    # Override the configured languages
    subtrans --log-level debug ep01.ass         # Show state transitions and queueing
    subtrans completions bash > subtrans.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. The API key is read from provider.api_key,
    then from the file named by provider.api_key_file, then from the
    GEMINI_API_KEY or GEMINI_KEY environment variables.

    Files whose name already ends with the output suffix, and files whose
    translation already exists, are skipped.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    args: TranslateArgs,
}

// @struct: Custom logger implementation, filtered by the global max level
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and tag for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[0;37m", "INFO "),
            Level::Debug => ("\x1B[0;90m", "DEBUG"),
            Level::Trace => ("\x1B[0;35m", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S");
            let (colour, tag) = Self::style_for_level(record.level());
            let _ = writeln!(std::io::stderr(), "\x1B[0;90m[{}]\x1B[0m {}{} {}\x1B[0m", now, colour, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "subtrans", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.args).await,
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(cli_level) = &options.log_level {
        let level: app_config::LogLevel = cli_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let config = load_config(&options)?;
    config.validate().context("Configuration validation failed")?;
    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    if options.inputs.is_empty() {
        return Err(anyhow!("INPUT_PATH is required when no subcommand is specified"));
    }
    let inputs = FileManager::collect_inputs(&options.inputs)?;
    if inputs.is_empty() {
        warn!("No .srt or .ass file found in the given inputs");
        return Ok(());
    }

    let api_key = config.provider.resolve_api_key()?.ok_or_else(|| {
        anyhow!(
            "Could not retrieve the Gemini API key, set provider.api_key or provider.api_key_file in {} or the {} environment variable",
            options.config_path,
            API_KEY_VARIABLES.join(" or ")
        )
    })?;

    let orchestrator = build_orchestrator(&config, api_key);
    info!(
        "subtrans: {} -> {} with {}, {} input files",
        config.source_language,
        config.target_language,
        config.provider.model,
        inputs.len()
    );

    let summary = orchestrator.run(inputs).await;
    summary.log();

    if let Some(issues_log) = &options.issues_log {
        for issue in summary.issues() {
            if let Err(e) = FileManager::append_to_log_file(issues_log, &issue) {
                warn!("Failed to write issues to {}: {}", issues_log.display(), e);
                break;
            }
        }
    }

    if summary.has_failures() {
        return Err(anyhow!("{} of {} files failed", summary.failed(), summary.files.len()));
    }
    Ok(())
}

/// Load the config file, creating a default one when missing, and apply CLI overrides
fn load_config(options: &TranslateArgs) -> Result<Config> {
    let config_path = Path::new(&options.config_path);
    let mut config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", options.config_path);
        let config = Config::default();
        config.save(config_path)?;
        config
    };

    if let Some(model) = &options.model {
        config.provider.model = model.clone();
    }
    if let Some(source_language) = &options.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    Ok(config)
}

fn build_orchestrator(config: &Config, api_key: String) -> Orchestrator<Gemini> {
    let provider = Gemini::from_config(&config.provider, api_key);
    let admission = AdmissionController::new(AdmissionConfig::from(&config.limits));
    let retries = Arc::new(RetryBudget::new(config.limits.max_retries));
    let client = RateLimitedClient::new(Arc::new(provider), admission, retries);

    let prompt = PromptTemplate::new(
        &config.provider.prompt,
        &config.source_language,
        &config.target_language,
        config.chunking.chunk_lines,
    );
    let reconciler = Reconciler::new(client, prompt, ReconcilerConfig::from(&config.chunking));
    Orchestrator::new(reconciler, config.ass.clone(), &config.outfile_suffix)
}
