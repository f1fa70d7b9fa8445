//! Model tooling for HemoLink ML
//!
//! Trains the eligibility model from synthetic or CSV donor data and checks
//! that a saved artifact scores and normalizes as expected.
//!
//! Run: cargo run --bin hemolink-model -- synthetic

use clap::{Args, Parser, Subcommand};
use hemolink_ml::core::{
    extract_flags, generate_synthetic_data, load_csv_data, train, EligibilityModel, EligibilityScorer, ModelStore,
    ScoringInput, TrainingOptions, SERIOUS_CONDITION_SCORE_CAP,
};
use hemolink_ml::models::{HealthFlag, SERIOUS_CONDITION};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "hemolink-model", about = "Train and verify the donor eligibility model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train on synthetic donors labelled by the reference rules
    Synthetic {
        #[arg(long, default_value_t = 5000)]
        samples: usize,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Train on a blood donor CSV export
    Csv {
        /// Path to blood_donor_dataset.csv
        path: PathBuf,
        /// Fraction of rows held out to report validation MAE
        #[arg(long, default_value_t = 0.15)]
        validation_fraction: f64,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Load a saved model and run smoke checks against it
    Check {
        #[arg(long, default_value = "artifacts/eligibility_model.json")]
        model: PathBuf,
    },
}

#[derive(Debug, Args)]
struct TrainArgs {
    #[arg(long, default_value = "artifacts/eligibility_model.json")]
    output: PathBuf,
    #[arg(long, default_value_t = 100)]
    trees: usize,
    #[arg(long, default_value_t = 8)]
    max_depth: u16,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl TrainArgs {
    fn options(&self, validation_fraction: f64) -> TrainingOptions {
        TrainingOptions {
            n_trees: self.trees,
            max_depth: self.max_depth,
            seed: self.seed,
            validation_fraction,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Synthetic { samples, train: args } => {
            let data = generate_synthetic_data(samples, args.seed);
            fit_and_save(&data, args.options(0.0), &args.output)
        }
        Command::Csv {
            path,
            validation_fraction,
            train: args,
        } => load_csv_data(&path, args.seed)
            .map_err(|e| e.to_string())
            .and_then(|data| {
                info!("Loaded {} samples from {}", data.len(), path.display());
                fit_and_save(&data, args.options(validation_fraction), &args.output)
            }),
        Command::Check { model } => check(&model).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn fit_and_save(data: &hemolink_ml::core::Dataset, options: TrainingOptions, output: &Path) -> Result<(), String> {
    let model = train(data, options).map_err(|e| e.to_string())?;
    if let Some(mae) = model.metadata.validation_mae {
        info!("Validation MAE (score 0-100): {:.2}", mae);
    }
    model.save(output).map_err(|e| e.to_string())?;
    info!("Model saved to {}", output.display());
    Ok(())
}

async fn check(path: &Path) -> Result<(), String> {
    let model = EligibilityModel::load(path).map_err(|e| e.to_string())?;
    let scorer = EligibilityScorer::new(ModelStore::with_model(path, model), None, false);

    let input = ScoringInput::new(120, 5.0, true, vec![]);
    let assessment = scorer.assess(&input).await.map_err(|e| e.to_string())?;
    if assessment.reasons.is_empty() {
        return Err(format!("bad prediction: {:?}", assessment));
    }
    info!("[OK] predict: score={}, reasons={:?}", assessment.score, assessment.reasons);

    let flags = extract_flags("I have cancer");
    if !flags.contains(&HealthFlag::SeriousCondition) {
        return Err(format!("expected serious_condition in {:?}", flags));
    }
    info!("[OK] normalize-health: 'I have cancer' -> {:?}, 'No illness' -> {:?}", flags, extract_flags("No illness"));

    let input = ScoringInput::new(120, 2.0, true, vec![SERIOUS_CONDITION.to_string()]);
    let capped = scorer.assess(&input).await.map_err(|e| e.to_string())?;
    if capped.score > SERIOUS_CONDITION_SCORE_CAP {
        return Err(format!(
            "expected score <= {} for serious_condition, got {}",
            SERIOUS_CONDITION_SCORE_CAP, capped.score
        ));
    }
    info!("[OK] serious_condition caps score to {}", capped.score);

    info!("ML pipeline is working.");
    Ok(())
}
