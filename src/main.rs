mod analysis;
mod completion;
mod config;
mod dialogue;
mod objections;
mod report;
mod topics;
mod vocabulary;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;

use analysis::DialogueAnalyzer;
use completion::CompletionClient;
use completion::openai::OpenAiClient;
use config::{Environment, Settings};
use objections::{ObjectionAnalyzer, UnknownObjectionPolicy};
use topics::TopicAnalyzer;

/// Slack on top of the HTTP timeout so the client reports its own timeout first.
const CALL_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(StructOpt, Debug)]
#[structopt(
    name = "sales-dialogue-analyzer",
    about = "Check sales dialogues for covered topics and handled objections"
)]
struct Args {
    /// JSON file with the dialogues to analyze
    #[structopt(short, long, default_value = "dialogues_sample.json")]
    input: PathBuf,

    /// Where to write the analysis results (overwritten)
    #[structopt(short, long, default_value = "analysis_results.json")]
    output: PathBuf,

    /// Path to a settings TOML file
    #[structopt(short = "c", long)]
    config: Option<PathBuf>,

    /// API key for the completion service (defaults to $OPENAI_API_KEY)
    #[structopt(long)]
    api_key: Option<String>,

    /// What to do with objections outside the known taxonomy (drop, keep or reject)
    #[structopt(long, default_value = "drop")]
    unknown_objections: UnknownObjectionPolicy,

    /// Print the summary of an existing results file instead of analyzing
    #[structopt(long)]
    summarize: Option<PathBuf>,

    /// Log debug output
    #[structopt(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::from_args();
    init_tracing(args.verbose)?;

    if let Some(path) = &args.summarize {
        let results = report::read_results(path).await?;
        println!("{}", report::Summary::of(&results));
        return Ok(());
    }

    let environment = envy::from_env::<Environment>().map_err(config::ConfigError::from)?;
    let api_key = config::resolve_api_key(args.api_key.clone(), environment)?;
    let settings = Settings::load(args.config.as_deref()).await?;

    println!("Loading dialogues from {}…", args.input.display());
    let conversations = dialogue::load_conversations(&args.input).await?;
    println!("Loaded {} dialogues.", conversations.len());

    let request_timeout = Duration::from_secs(settings.request_timeout_secs);
    let client: Arc<dyn CompletionClient> = Arc::new(
        OpenAiClient::new(
            settings.endpoint.clone(),
            settings.model.clone(),
            api_key,
            request_timeout,
        )
        .context("Failed to build HTTP client")?,
    );

    let analyzer = DialogueAnalyzer::new(
        TopicAnalyzer::new(client.clone(), settings.topics, settings.temperature),
        ObjectionAnalyzer::new(
            client,
            settings.objections,
            settings.temperature,
            args.unknown_objections,
        ),
        request_timeout + CALL_TIMEOUT_GRACE,
        settings.max_in_flight,
    );

    let results = analyzer.analyze_all(&conversations).await?;

    report::write_results(&args.output, &results).await?;
    println!("Results saved to {}", args.output.display());

    println!();
    println!("{}", report::Summary::of(&results));

    Ok(())
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_env("DIALOGUE_ANALYZER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("Failed to initialize tracing subscriber: {error}"))
}
