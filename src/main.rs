use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

mod browser_pool;
mod cli;
mod config;
mod consolidator;
mod crawler;
mod dns;
mod fetcher;
mod input;
mod journey;
mod link_scorer;
mod llm;
mod logger;
mod outcomes;
mod page_classifier;
mod pipeline;
mod regex_extractor;
mod reports;
mod robots;
mod schemas;
mod url_normalizer;

use cli::Args;
use config::AppConfig;
use dns::DnsProber;
use fetcher::ChromeFetcher;
use llm::GeminiClient;
use logger::{PipelineLogger, VerbosityLevel};
use pipeline::{generate_run_id, Pipeline};
use robots::RobotsCache;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --init before any other processing
    if args.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("Created default configuration file at: {}", path.display());
                println!("Edit this file to customize settings, then run contactfinder again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut app_config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            match AppConfig::prompt_create_config() {
                Ok(Some(created_path)) => {
                    println!("Created default configuration file at: {}", created_path.display());
                    println!("Edit this file to customize settings, then run contactfinder again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("Configuration file not found at: {}", path.display());
                    eprintln!("Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = args.validate() {
        eprintln!("Invalid arguments: {}", e);
        std::process::exit(1);
    }
    args.apply_to(&mut app_config);
    if let Err(e) = app_config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let run_id = generate_run_id();
    let run_dir = Path::new(&app_config.output.base_dir).join(&run_id);
    std::fs::create_dir_all(&run_dir)?;

    // Diagnostic logging: one file layer for the run log, one console
    // layer, each with its own level from the config.
    let file_level: tracing_subscriber::filter::LevelFilter = app_config
        .logging
        .log_level
        .parse()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);
    let console_level: tracing_subscriber::filter::LevelFilter = app_config
        .logging
        .console_log_level
        .parse()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::WARN);
    let log_file = std::fs::File::create(run_dir.join(format!("pipeline_run_{}.log", run_id)))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(file_level),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_level),
        )
        .init();

    let verbosity = VerbosityLevel::from_verbose_count(args.verbose);
    let logger = match &args.log_file {
        Some(path) => PipelineLogger::with_log_file(verbosity, path.clone(), args.no_color),
        None => PipelineLogger::new(verbosity, args.no_color),
    };

    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal, exiting...");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    logger.info(&format!("Run ID: {}", run_id));
    logger.info(&format!("Output directory: {}", run_dir.display()));

    let config = Arc::new(app_config);
    let robots = Arc::new(RobotsCache::new(
        &config.scraper.user_agent,
        &config.scraper.robots_txt_user_agent,
        config.scraper.respect_robots_txt,
    ));
    let fetcher = Arc::new(ChromeFetcher::new(&config.scraper, robots));
    let prober = Arc::new(DnsProber::new());

    let llm_client = match config.llm_api_key() {
        Some(api_key) => Some(Arc::new(GeminiClient::new(&config.llm, api_key)) as Arc<dyn llm::LlmClient>),
        None => {
            logger.warn(
                "No LLM API key configured (llm.api_key or CONTACTFINDER_LLM_API_KEY); \
                 extraction will stop after the regex stage",
            );
            None
        }
    };

    let input_path = config.input.file_path.clone();
    let pipeline = Pipeline::new(config, fetcher, llm_client, prober, logger.clone());

    let summary = pipeline.run(&run_id, Path::new(&input_path)).await?;

    logger.success(&format!(
        "Reports written to {}",
        summary.run_dir.display()
    ));

    if logger.is_log_export_enabled() {
        match logger.export_logs() {
            Ok(()) => {
                if let Some(ref log_file) = args.log_file {
                    println!("Execution logs exported to: {}", log_file);
                    println!("Total log entries: {}", logger.get_log_count());
                }
            }
            Err(e) => {
                eprintln!("Warning: failed to export logs: {}", e);
            }
        }
    }

    Ok(())
}
