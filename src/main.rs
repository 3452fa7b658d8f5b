//! Birdsong Classifier CLI
//!
//! Entry point for data preparation, training, evaluation, prediction and
//! recording downloads. All paths resolve against the discovered project root.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use birdsong_classifier::backend::backend_name;
use birdsong_classifier::download::{parse_species_list, DEFAULT_SPECIES};
use birdsong_classifier::utils::format_duration;
use birdsong_classifier::utils::logging::{init_logging, LogConfig, LogLevel};
use birdsong_classifier::{
    predict_bird_species, prepare_data, run_evaluation, run_training, AppConfig, DownloadOptions, Downloader,
    MatlabEngine, ProjectPaths, TrainingOverrides,
};

/// Bird species classification from song spectrograms
#[derive(Parser, Debug)]
#[command(name = "birdsong")]
#[command(version)]
#[command(about = "Bird species classification from song spectrograms with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); wins over -v and -q
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Config file (defaults to birdsong.toml in the project root)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load spectrograms, split, standardize and write the train/test arrays
    PrepareData,

    /// Train the classifier on data/processed/train
    Train {
        /// Number of training epochs (overrides the config)
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training (overrides the config)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Evaluate the trained model on data/processed/test
    Evaluate,

    /// Predict the species of one audio recording
    Predict {
        /// Path to the audio file
        audio: PathBuf,

        /// Write the prediction as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download recordings from xeno-canto
    Download {
        /// Comma-separated English species names
        #[arg(short, long, default_value = DEFAULT_SPECIES)]
        species: String,

        /// Recording quality grade (A-E)
        #[arg(short, long)]
        quality: Option<String>,

        /// Result page to download from
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Number of files per species
        #[arg(short, long)]
        num_files: Option<usize>,

        /// Number given to the first saved file
        #[arg(long, default_value = "1")]
        start_index: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level {
        log_config = log_config.with_level(level);
    }

    let _ = init_logging(&log_config);

    print_banner();

    let paths = ProjectPaths::discover().context("could not determine the project root")?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_path());
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("could not load configuration from {}", config_path.display()))?;
    info!("Project root: {:?}", paths.root());

    match cli.command {
        Commands::PrepareData => cmd_prepare_data(&paths, &config, !cli.quiet)?,
        Commands::Train { epochs, batch_size } => {
            cmd_train(&paths, &config, &TrainingOverrides { epochs, batch_size })?
        }
        Commands::Evaluate => cmd_evaluate(&paths, &config)?,
        Commands::Predict { audio, output } => cmd_predict(&paths, &config, &audio, output)?,
        Commands::Download {
            species,
            quality,
            page,
            num_files,
            start_index,
        } => {
            let options = DownloadOptions {
                species: parse_species_list(&species),
                quality: quality.unwrap_or_else(|| config.download.quality.clone()),
                page,
                num_files: num_files.unwrap_or(config.download.num_files),
                start_index,
            };
            cmd_download(&paths, &config, &options)?
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════╗
 ║   Birdsong Classifier                                    ║
 ║   Species recognition from song spectrograms with Burn   ║
 ╚══════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
    println!("{}", "-".repeat(title.len()).cyan());
}

fn cmd_prepare_data(paths: &ProjectPaths, config: &AppConfig, show_progress: bool) -> Result<()> {
    let started = std::time::Instant::now();
    let prepared = prepare_data(paths, config, show_progress)?;

    section("Loaded images");
    for (category, count) in &prepared.load_report.per_category {
        println!("  {:<20} {:>6}", category, count);
    }
    if !prepared.load_report.skipped.is_empty() {
        println!(
            "  {} {} unreadable file(s) skipped",
            "Warning:".yellow(),
            prepared.load_report.skipped.len()
        );
    }

    section("Class distribution");
    print!("{}", prepared.split);

    section("Normalization");
    println!("  mean {:.4}  std {:.4}", prepared.stats.mean, prepared.stats.std);
    println!("  saved to {}", paths.train_stats_path().display());

    println!();
    println!(
        "{} Data prepared in {}",
        "Done.".green().bold(),
        format_duration(started.elapsed().as_secs_f64())
    );
    Ok(())
}

fn cmd_train(paths: &ProjectPaths, config: &AppConfig, overrides: &TrainingOverrides) -> Result<()> {
    info!("Training on the {} backend", backend_name());
    let history = run_training(paths, config, overrides)?;

    section("Training summary");
    if let (Some(loss), Some(acc)) = (history.loss.last(), history.accuracy.last()) {
        println!("  final loss {:.4}  accuracy {:.2}%", loss, acc * 100.0);
    }
    if let Some((epoch, acc)) = history.best_val_accuracy() {
        println!("  best validation accuracy {:.2}% (epoch {})", acc * 100.0, epoch + 1);
    }
    println!("  model saved to {}", paths.model_path().display());
    Ok(())
}

fn cmd_evaluate(paths: &ProjectPaths, config: &AppConfig) -> Result<()> {
    let report = run_evaluation(paths, config)?;

    section("Overall");
    println!(
        "  loss {:.4}  accuracy {:.2}%  ({} samples)",
        report.overall.loss,
        report.overall.accuracy * 100.0,
        report.overall.samples
    );

    section("Per species");
    for species in &report.species {
        match (species.loss, species.accuracy) {
            (Some(loss), Some(acc)) => println!(
                "  {:<20} loss {:.4}  accuracy {:.2}%  ({} samples)",
                species.species,
                loss,
                acc * 100.0,
                species.samples
            ),
            _ => println!("  {:<20} {}", species.species, "no test samples".yellow()),
        }
    }

    section("Classification report");
    println!("{}", report.classification_report.render(4));

    section("Confusion matrix (rows: true, columns: predicted)");
    println!("{}", report.confusion_matrix.display(&report.categories));

    println!("Results written to {}", paths.results_dir().display());
    Ok(())
}

fn cmd_predict(
    paths: &ProjectPaths,
    config: &AppConfig,
    audio: &std::path::Path,
    output: Option<PathBuf>,
) -> Result<()> {
    let engine = MatlabEngine::new(&config.engine, paths.root());
    let outcome = predict_bird_species(audio, engine, paths, config)?;

    section("Prediction");
    println!("  Predicted species: {}", outcome.predicted_species.green().bold());
    println!("  Confidence scores:");
    for (species, score) in &outcome.confidence_scores {
        println!("    {:<20} {:>6.2}%", species, score * 100.0);
    }
    println!(
        "  Based on {} spectrogram(s)",
        outcome.individual_predictions.len()
    );

    if let Some(path) = output {
        outcome.save_json(&path)?;
        println!("  Saved prediction to {}", path.display());
    }
    Ok(())
}

fn cmd_download(paths: &ProjectPaths, config: &AppConfig, options: &DownloadOptions) -> Result<()> {
    let downloader = Downloader::new(&config.download.api_url)?;
    let summary = downloader.download_all(options, paths)?;

    section("Download summary");
    println!("  downloaded {}", summary.downloaded.to_string().green());
    println!("  skipped    {}", summary.skipped);
    println!("  failed     {}", summary.failed.to_string().red());
    Ok(())
}
