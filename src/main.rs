// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use intake_rs::intake::application::{eligibility_status, visible_blocks, ApplicantService};
use intake_rs::intake::config::IntakeConfig;
use intake_rs::intake::loader::{answers_from_yaml, BundleLoader};
use intake_rs::intake::program::VersionGraph;
use intake_rs::intake::server::{self, AppState};
use intake_rs::intake::store::MemoryStore;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every bundle in the bundle directory and serve the HTTP API
    Serve {
        /// Port to listen on (defaults to INTAKE_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of program bundles (defaults to INTAKE_BUNDLE_DIR)
        #[arg(short, long)]
        bundles: Option<PathBuf>,
    },
    /// Load and validate a program bundle
    Check {
        /// Path to the bundle file
        bundle: PathBuf,
    },
    /// Show visible blocks and eligibility for an answer file
    Evaluate {
        /// Path to the bundle file
        #[arg(short, long)]
        bundle: PathBuf,

        /// YAML map of `question.scalar: value`
        #[arg(short, long)]
        answers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = IntakeConfig::from_env();
    let loader = BundleLoader::new();

    match args.command {
        Commands::Serve { port, bundles } => {
            if let Some(port) = port {
                config.bind_port = port;
            }
            if let Some(dir) = bundles {
                config.bundle_dir = dir;
            }

            let store = MemoryStore::new(VersionGraph::new());
            match loader.load_dir(&config.bundle_dir) {
                Ok(bundles) => {
                    for bundle in bundles {
                        let version = bundle.install(store.graph()).await?;
                        log::info!("Loaded program {}", version.key());
                    }
                }
                Err(e) => log::warn!(
                    "No bundles loaded from {}: {}",
                    config.bundle_dir.display(),
                    e
                ),
            }

            let port = config.bind_port;
            let state = AppState::new(ApplicantService::new(store, config));
            server::serve(state, port).await?;
        }
        Commands::Check { bundle } => {
            let graph = VersionGraph::new();
            let version = loader.load_bundle(&bundle)?.install(&graph).await?;
            let questions = graph.questions_for(&version).await?;

            println!("Program {} is valid", version.key());
            for block in &version.blocks {
                println!(
                    "  {} ({} questions{}{})",
                    block.id,
                    block.questions.len(),
                    if block.visibility.is_some() { ", visibility" } else { "" },
                    if block.eligibility.is_some() { ", eligibility" } else { "" },
                );
            }
            println!("{} questions pinned", questions.len());
        }
        Commands::Evaluate { bundle, answers } => {
            let graph = VersionGraph::new();
            let version = loader.load_bundle(&bundle)?.install(&graph).await?;
            let questions = graph.questions_for(&version).await?;

            let content = std::fs::read_to_string(&answers)?;
            let answers = answers_from_yaml(&content, &version, &questions)?;
            let ctx = config.eval_context();

            let visible = visible_blocks(&version, &answers, &questions, &ctx)?;
            let status = eligibility_status(&version, &answers, &questions, &ctx)?;

            println!("Visible blocks:");
            for block in visible {
                println!("  {}", block.id);
            }
            println!("Eligible: {}", status.eligible);
            for condition in &status.failing_conditions {
                println!("  failing: {}", condition);
            }
        }
    }

    Ok(())
}
