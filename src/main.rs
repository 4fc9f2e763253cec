//! trivium CLI - Numeric trivia cards from an LLM backend or a CSV deck.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use trivium::front::{tty, web};
use trivium::models::SourceKind;
use trivium::source::load_cards_from_csv_dir;
use trivium::{Card, CardGenerator, CardSupply, Config, LlmClient, StyleValidator};

#[derive(Parser)]
#[command(name = "trivium")]
#[command(version)]
#[command(about = "Short numeric trivia cards from an LLM backend or a CSV deck")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play in the terminal
    Play,

    /// Serve the web front end
    Serve,

    /// Generate cards once and write them as JSONL
    Generate {
        /// Number of cards to generate
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Path to output JSONL file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate configuration file and card source
    Validate,

    /// Show example configuration
    ExampleConfig,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# trivium configuration file

[llm]
# Any OpenAI-compatible endpoint (vLLM, TGI, Ollama, llama.cpp, aggregators)
base_url = "http://localhost:8000"
model = "qwen2.5-7b-instruct"
# api_key = "sk-..."   # or set TRIVIUM_API_KEY
temperature = 0.7
max_tokens = 256       # 0 omits the field from requests
timeout_secs = 30
max_retries = 5
# response_format = "json_object"

[pool]
target_size = 25
refill_threshold = 10
batch_size = 1         # cards requested per backend call
concurrency = 1        # parallel fill workers

[source]
kind = "llm"           # or "csv"
# csv_dir = "questions"
# csv_delimiter = ";"

[web]
host = "127.0.0.1"
port = 8001
allow_shutdown = false

# [style] tunes the rejection rules; built-in defaults are usually fine.
# [style]
# min_question_chars = 12
# max_question_chars = 180
# min_answer = 0.001
# max_answer = 10000000.0
"#;
    println!("{example}");
}

fn write_jsonl(path: &Path, cards: &[Card]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file {path:?}"))?;
    let mut writer = std::io::BufWriter::new(file);

    for card in cards {
        let json = serde_json::to_string(card).context("Failed to serialize card")?;
        writeln!(writer, "{json}").context("Failed to write output")?;
    }
    writer.flush().context("Failed to flush output")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::ExampleConfig => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            config.validate().context("Invalid configuration")?;

            info!("Configuration is valid");
            match config.source.kind {
                SourceKind::Llm => {
                    let llm = config.llm()?;
                    info!("  Source:  llm");
                    info!("  Backend: {} at {}", llm.model, llm.base_url);
                    info!(
                        "  Pool:    {} cards, refill below {}",
                        config.pool.target_size, config.pool.refill_threshold
                    );

                    let client = LlmClient::new(llm.clone())?;
                    client
                        .health_check()
                        .await
                        .context("Backend health check failed")?;
                    info!("Backend answered a test request");
                }
                SourceKind::Csv => {
                    let dir = config
                        .source
                        .csv_dir
                        .clone()
                        .context("source.csv_dir is required when source.kind = \"csv\"")?;
                    let cards =
                        load_cards_from_csv_dir(&dir, config.source.delimiter_byte()?)?;
                    info!("  Source:  csv");
                    info!("  Cards:   {} loaded from {:?}", cards.len(), dir);
                }
            }
            return Ok(());
        }

        Commands::Play => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            config.validate().context("Invalid configuration")?;

            let supply = CardSupply::from_config(&config)?;
            tty::run(supply).await?;
        }

        Commands::Serve => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            config.validate().context("Invalid configuration")?;

            let supply = CardSupply::from_config(&config)?;
            web::serve(supply, &config.web).await?;
        }

        Commands::Generate { count, output } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            config.validate().context("Invalid configuration")?;

            let llm = config.llm()?;
            let client = LlmClient::new(llm.clone())?;
            let validator = StyleValidator::new(&config.style)?;
            let generator = CardGenerator::new(client, validator);

            let run_id = uuid::Uuid::new_v4();
            let started = std::time::Instant::now();
            info!(run_id = %run_id, count, "Starting one-shot generation");

            let cards = generator.generate_batch(count).await?;
            write_jsonl(&output, &cards)?;

            println!("\n=== Generation Complete ===");
            println!("Run id:      {run_id}");
            println!("Requested:   {count}");
            println!("Accepted:    {}", cards.len());
            println!("Runtime:     {:.1}s", started.elapsed().as_secs_f64());
            println!("Finished:    {}", chrono::Utc::now().to_rfc3339());
            println!("Output:      {output:?}");
        }
    }

    Ok(())
}
