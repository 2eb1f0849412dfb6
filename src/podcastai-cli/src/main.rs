//! PodcastAI CLI - Podcast Assembly Plan tool
//!
//! Validates, orchestrates and generates Podcast Assembly Plans, or serves
//! the orchestration endpoint over HTTP.

use clap::{Parser, Subcommand};
use colored::Colorize;
use podcastai_core::api::{AppState, router};
use podcastai_core::validate::messages;
use podcastai_core::{
    Config, DispatchEvent, GenerationRequest, Pipeline, PlanGenerator, SegmentBreakdown,
    SegmentStatus,
};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "podcastai",
    version,
    about = "Podcast Assembly Plan tool - validate, render and stitch podcast episodes",
    long_about = "A CLI for validating Podcast Assembly Plans, dispatching their segments to speech and music backends, and generating new plans with OpenAI-compatible APIs."
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "podcastai.toml", value_name = "FILE", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the orchestration API
    Serve,

    /// Check a plan file without rendering anything
    Validate {
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
    },

    /// Render every segment of a plan file
    Run {
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Concatenate the rendered segments into one episode afterwards
        #[arg(long)]
        stitch: bool,
    },

    /// Ask a model to write a plan
    Generate {
        /// What the episode should be about
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Write the plan here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Model override
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    apply_env_overrides(&mut config);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Validate { plan } => validate(&plan),
        Command::Run { plan, stitch } => run(&config, &plan, stitch).await,
        Command::Generate { prompt, out, model } => {
            generate(&config, prompt, model, out.as_deref()).await
        }
    }
}

/// Environment variables win over the config file for API credentials.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(base) = env::var("OPENAI_API_BASE").or_else(|_| env::var("OPENAI_BASE_URL")) {
        config.generation.api_base = base;
    }
    if let Ok(key) = env::var("OPENAI_API_KEY") {
        config.generation.api_key = Some(key);
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::from_config(&config)?;
    let mut state = AppState::new(Arc::new(pipeline));

    if config.generation.api_key.is_some() {
        state = state.with_generator(Arc::new(PlanGenerator::new(config.generation.clone())?));
    } else {
        tracing::warn!("OPENAI_API_KEY not set; /generate-pap is disabled");
    }

    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;
    tracing::info!(addr = %config.server.listen, "podcastai listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = read_plan(path)?;

    match Pipeline::prepare(raw) {
        Ok(plan) => {
            println!(
                "{} {} ({})",
                "Valid plan:".bright_green().bold(),
                plan.title.bright_white(),
                plan.episode_id.dimmed()
            );
            print_breakdown(&SegmentBreakdown::of(&plan), plan.segments.len());
            Ok(())
        }
        Err(errors) => {
            eprintln!(
                "{} {} problem(s) found",
                "Invalid plan:".red().bold(),
                errors.len()
            );
            for message in messages(&errors) {
                eprintln!("  {} {}", "-".red(), message);
            }
            std::process::exit(1);
        }
    }
}

async fn run(config: &Config, path: &Path, stitch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let raw = read_plan(path)?;
    let pipeline = Pipeline::from_config(config)?.with_callback(create_console_callback());

    let run = match pipeline.orchestrate(raw).await {
        Ok(run) => run,
        Err(errors) => {
            eprintln!("{}", "Plan rejected:".red().bold());
            for message in messages(&errors) {
                eprintln!("  {} {}", "-".red(), message);
            }
            std::process::exit(1);
        }
    };

    let summary = &run.summary;
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", summary.title.bold(), summary.episode_id)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    print_breakdown(&summary.segment_breakdown, summary.total_segments);
    println!(
        "  {} {}  {} {}  {} {}  {} {}",
        "success".green(),
        summary.outcomes.success,
        "failed".yellow(),
        summary.outcomes.failed,
        "error".red(),
        summary.outcomes.error,
        "skipped".dimmed(),
        summary.outcomes.skipped
    );
    println!();

    let complete = summary.outcomes.all_succeeded();
    if !complete {
        eprintln!(
            "{}",
            "Warning: some segments did not render; the episode will have gaps.".yellow()
        );
    }

    if stitch {
        match pipeline.stitch(&run).await {
            Ok(outcome) => println!(
                "{} {} ({} files, {} bytes)",
                "Episode written:".bright_green().bold(),
                outcome.filepath,
                outcome.files_stitched,
                outcome.size
            ),
            Err(e) => {
                eprintln!("{} {}", "Stitching failed:".red().bold(), e);
                std::process::exit(1);
            }
        }
    }

    if !complete {
        std::process::exit(2);
    }
    Ok(())
}

async fn generate(
    config: &Config,
    prompt: String,
    model: Option<String>,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.generation.api_key.is_none() {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
    }

    let generator = PlanGenerator::new(config.generation.clone())?;
    let mut request = GenerationRequest::new(prompt);
    request.model = model;

    let plan = generator.generate(&request).await?;
    let rendered = serde_json::to_string_pretty(&plan)?;

    match out {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("{} {}", "Plan written:".bright_green().bold(), path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn read_plan(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let raw = serde_json::from_str(&content)
        .map_err(|e| format!("{} is not valid JSON: {}", path.display(), e))?;
    Ok(raw)
}

fn print_breakdown(breakdown: &SegmentBreakdown, total: usize) {
    println!(
        "  {} {} (dialogue {}, music {}, ads {}, weather {})",
        "Segments:".bold(),
        total,
        breakdown.dialogue,
        breakdown.music,
        breakdown.ads,
        breakdown.weather
    );
}

/// Create a callback that prints dispatch events to the console.
fn create_console_callback() -> Box<dyn Fn(DispatchEvent) + Send + Sync> {
    Box::new(move |event| match event {
        DispatchEvent::SegmentStart {
            index,
            total,
            segment_id,
            kind,
            preview,
        } => {
            println!(
                "{} {} {} {}",
                format!("[{}/{}]", index + 1, total).dimmed(),
                "▶".bright_cyan(),
                segment_id.bright_cyan().bold(),
                format!("({})", kind).yellow()
            );
            if !preview.is_empty() {
                println!("      {}", preview.dimmed());
            }
        }
        DispatchEvent::SegmentFinished {
            segment_id,
            status,
            detail,
            ..
        } => {
            let label = match status {
                SegmentStatus::Success => status.to_string().green().bold(),
                SegmentStatus::Failed => status.to_string().yellow().bold(),
                SegmentStatus::Error => status.to_string().red().bold(),
                SegmentStatus::Skipped => status.to_string().dimmed(),
            };
            println!("      {} {} {}", label, segment_id, detail.dimmed());
        }
        DispatchEvent::RunEnd { .. } => {
            // Handled in run
        }
    })
}
