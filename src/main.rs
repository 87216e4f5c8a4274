use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use itertools::Itertools;
use tracing_subscriber::EnvFilter;

use challenge_grader::{
    config::GraderConfig,
    core::{
        catalog::ChallengeCatalog,
        dispatch::{Dispatcher, GradingReport},
        evaluator::Evaluator,
    },
    native::node::NodeSandbox,
};

#[derive(Parser)]
#[command(name = "challenge-grader")]
#[command(about = "Grades coding challenge solutions in an isolated worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available challenges
    List,

    /// Show a challenge with its starter code
    Show {
        /// Challenge ID
        id: String,

        /// Starter code language
        #[arg(short, long, default_value = "javascript")]
        language: String,
    },

    /// Run a solution against a challenge's test cases
    Run {
        /// Challenge ID
        #[arg(short, long)]
        challenge: String,

        /// Solution language
        #[arg(short, long, default_value = "javascript")]
        language: String,

        /// Path to the solution source
        #[arg(short, long)]
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let config = GraderConfig::from_env()?;
    tracing::debug!("Config: {:?}", config);

    let catalog = Arc::new(ChallengeCatalog::builtin()?);
    let evaluator = Evaluator::new(
        Arc::new(NodeSandbox::new(&config.node_path)),
        config.limits(),
    );
    let dispatcher = Dispatcher::new(catalog, evaluator);
    let catalog = dispatcher.catalog();

    match cli.command {
        Commands::List => {
            for challenge in catalog.iter() {
                println!(
                    "{:<28} {:<7} {}",
                    challenge.id,
                    challenge.difficulty,
                    challenge.topics.iter().join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { id, language } => {
            let Some(challenge) = catalog.get(&id) else {
                eprintln!("Challenge with ID {id} not found");
                return Ok(ExitCode::FAILURE);
            };
            println!("{} ({})\n", challenge.title, challenge.difficulty);
            println!("{}\n", challenge.description);
            println!("{}\n", challenge.example);
            if let Some(code) = catalog.starter_code(&id, &language) {
                println!("{code}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            challenge,
            language,
            file,
            json,
        } => {
            let code = tokio::fs::read_to_string(&file).await?;
            let report = dispatcher.run_tests(&challenge, &code, &language).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            Ok(if report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn print_report(report: &GradingReport) {
    for (idx, verdict) in report.verdicts.iter().enumerate() {
        let mark = if verdict.passed { "PASS" } else { "FAIL" };
        println!("[{mark}] #{} {}", idx + 1, verdict.input);
        if !verdict.passed {
            println!("       expected: {}", verdict.expected);
            println!("       {}", verdict.actual_output);
        }
    }
    println!("\n{}/{} passed", report.passed, report.total);
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
