use crate::backend::SolverProcess;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use compass::core::model::ModelDocument;
use compass::engine::collector::AggregatedArtifact;
use compass::engine::config::RunConfig;
use compass::engine::dispatch::{QueueDispatcher, TorqueScheduler};
use compass::engine::progress::ProgressReporter;
use compass::workflows::compass::{RunOutcome, Toolkit};
use compass::workflows;
use tracing::info;

pub fn run(config: &RunConfig) -> Result<()> {
    let model_path = ModelDocument::locate(&config.model_dir, &config.model)?;
    info!("Loading metabolic model from {:?}", &model_path);
    let model = ModelDocument::load(&model_path)?;
    info!(
        reactions = model.reactions.len(),
        metabolites = model.metabolites.len(),
        "Model loaded."
    );

    let backend = SolverProcess::new(&config.solver, config.num_threads);
    let dispatcher = match &config.torque_queue {
        Some(queue) => {
            let program = std::env::current_exe()?;
            Some(QueueDispatcher::new(
                Box::new(TorqueScheduler::new(queue.clone())),
                program,
            ))
        }
        None => None,
    };
    let toolkit = Toolkit {
        model: &model,
        optimizer: &backend,
        penalty_model: &backend,
        dispatcher: dispatcher.as_ref(),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the Compass workflow...");
    let outcome = workflows::compass::run(config, &toolkit, &reporter)?;
    print_summary(&outcome);
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::GenesListed { path, count } => {
            println!("Wrote {} gene(s) to {}", count, path.display());
        }
        RunOutcome::Precached { entries, rebuilt } => {
            if *rebuilt {
                println!("Flux range cache built with {} entries.", entries);
            } else {
                println!("Flux range cache already built ({} entries).", entries);
            }
        }
        RunOutcome::SingleSample(result) => {
            println!(
                "Sample {} ({}) written to {}",
                result.index,
                result.name,
                result.directory.display()
            );
        }
        RunOutcome::Dispatched(receipt) => {
            println!(
                "Submitted {} job(s). Run with --collect once they finish.",
                receipt.job_ids.len()
            );
        }
        RunOutcome::Collected(artifacts) | RunOutcome::Completed(artifacts) => {
            for artifact in artifacts {
                match artifact {
                    AggregatedArtifact::Table { kind, path, table } => println!(
                        "  {:<11} {} rows x {} samples -> {}",
                        kind.name(),
                        table.len(),
                        table.columns().len(),
                        path.display()
                    ),
                    AggregatedArtifact::Model { path } => {
                        println!("  {:<11} {}", "model", path.display())
                    }
                }
            }
        }
    }
}
