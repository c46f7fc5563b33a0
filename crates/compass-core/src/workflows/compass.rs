use super::precache;
use crate::core::io::atomic::write_atomic;
use crate::core::io::expression::sample_names;
use crate::core::model::MetabolicModel;
use crate::engine::collector::{AggregatedArtifact, ResultCollector};
use crate::engine::config::RunConfig;
use crate::engine::dispatch::{DispatchReceipt, QueueDispatcher};
use crate::engine::error::EngineError;
use crate::engine::executor::{WorkerPool, available_workers};
use crate::engine::phase::{PhaseRecord, PhaseState};
use crate::engine::precache::PrecacheStore;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::runner::{SampleResult, SampleRunner, SampleTask};
use crate::engine::solver::{Optimizer, PenaltyModel};
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// The collaborators a run drives.
pub struct Toolkit<'a> {
    pub model: &'a dyn MetabolicModel,
    pub optimizer: &'a dyn Optimizer,
    pub penalty_model: &'a dyn PenaltyModel,
    /// Required when the configuration names a batch queue.
    pub dispatcher: Option<&'a QueueDispatcher>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    GenesListed { path: PathBuf, count: usize },
    Precached { entries: usize, rebuilt: bool },
    SingleSample(SampleResult),
    Collected(Vec<AggregatedArtifact>),
    Dispatched(DispatchReceipt),
    Completed(Vec<AggregatedArtifact>),
}

/// Runs one complete Compass invocation.
///
/// The configuration selects the mode, checked in this order: gene listing, cache
/// check (precache-only runs stop here), single sample, collect, and finally the
/// penalties phase followed by queued or local scoring.
#[instrument(skip_all, name = "compass_workflow")]
pub fn run(
    config: &RunConfig,
    toolkit: &Toolkit,
    reporter: &ProgressReporter,
) -> Result<RunOutcome, EngineError> {
    config.validate()?;

    let started = Instant::now();
    debug!(version = env!("CARGO_PKG_VERSION"), "Compass started.");
    debug!(config = ?config, "Supplied configuration.");

    let outcome = run_mode(config, toolkit, reporter)?;

    debug!(elapsed = ?started.elapsed(), "Compass finished.");
    Ok(outcome)
}

fn run_mode(
    config: &RunConfig,
    toolkit: &Toolkit,
    reporter: &ProgressReporter,
) -> Result<RunOutcome, EngineError> {
    if let Some(path) = &config.list_genes {
        return list_genes(toolkit.model, path);
    }

    if config.has_data() {
        for dir in [config.output_dir.clone(), config.temp_root()] {
            fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        }
    }

    let pool = WorkerPool::new(config.num_processes.unwrap_or_else(available_workers))?;
    let store = PrecacheStore::new(config.cache_root());
    let (cache, rebuilt) = precache::ensure(
        &store,
        &config.model_key(),
        toolkit.model,
        toolkit.optimizer,
        &pool,
        config.precache,
        reporter,
    )?;
    if !config.has_data() {
        return Ok(RunOutcome::Precached {
            entries: cache.len(),
            rebuilt,
        });
    }

    let samples = sample_names(&config.data)?;
    let shared = Arc::new(config.clone());

    if let Some(index) = config.single_sample {
        let name = samples.get(index).ok_or(EngineError::SampleOutOfRange {
            index,
            count: samples.len(),
        })?;
        let task = SampleTask::new(index, name.clone(), shared);
        let result = SampleRunner::new(toolkit.model, toolkit.optimizer).run(&task)?;
        return Ok(RunOutcome::SingleSample(result));
    }

    let collector = ResultCollector::new(config.temp_root(), &config.output_dir);
    if config.collect {
        info!(
            source = %config.temp_root().display(),
            destination = %config.output_dir.display(),
            "Collecting results."
        );
        let artifacts = collector.collect(&samples, toolkit.model, config)?;
        return Ok(RunOutcome::Collected(artifacts));
    }

    evaluate_penalties(config, toolkit, &samples, reporter)?;

    let tasks: Vec<SampleTask> = samples
        .iter()
        .enumerate()
        .map(|(index, name)| SampleTask::new(index, name.clone(), shared.clone()))
        .collect();

    if let Some(queue) = &config.torque_queue {
        let dispatcher = toolkit.dispatcher.ok_or_else(|| {
            EngineError::Initialization(format!("no dispatcher available for queue '{queue}'"))
        })?;
        info!(queue = %queue, samples = tasks.len(), "Submitting Compass jobs to queue.");
        let receipt = dispatcher.dispatch(&tasks, config)?;
        return Ok(RunOutcome::Dispatched(receipt));
    }

    reporter.report(Progress::PhaseStart { name: "Scoring" });
    info!(
        samples = tasks.len(),
        workers = pool.workers(),
        "Processing samples."
    );
    let runner = SampleRunner::new(toolkit.model, toolkit.optimizer);
    pool.run("samples", tasks, |_, task| runner.run(&task), reporter)?;
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Collect" });
    let artifacts = collector.collect(&samples, toolkit.model, config)?;
    reporter.report(Progress::PhaseFinish);

    info!("Compass completed successfully.");
    Ok(RunOutcome::Completed(artifacts))
}

fn list_genes(model: &dyn MetabolicModel, path: &Path) -> Result<RunOutcome, EngineError> {
    let genes = model.genes();
    let content = genes.iter().join("\n");
    write_atomic(path, content.as_bytes()).map_err(|e| EngineError::io(path, e))?;
    info!(count = genes.len(), path = %path.display(), "Wrote model gene list.");
    Ok(RunOutcome::GenesListed {
        path: path.to_path_buf(),
        count: genes.len(),
    })
}

fn evaluate_penalties(
    config: &RunConfig,
    toolkit: &Toolkit,
    samples: &[String],
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    const PHASE: &str = "Penalties";

    if let Some(path) = &config.penalties_file {
        info!(path = %path.display(), "Using supplied reaction penalties.");
        reporter.report(Progress::PhaseSkipped { name: PHASE });
        return Ok(());
    }

    let record = PhaseRecord::penalties(&config.temp_root());
    if record.is_complete()? {
        info!(record = %record.path().display(), "Reaction penalties already evaluated.");
        reporter.report(Progress::PhaseSkipped { name: PHASE });
        reporter.report(Progress::Message(
            "Resuming execution from previous run...".to_string(),
        ));
        return Ok(());
    }

    reporter.report(Progress::PhaseStart { name: PHASE });
    info!(samples = samples.len(), "Evaluating reaction penalties.");
    record.mark(PhaseState::InProgress)?;
    let penalties = toolkit
        .penalty_model
        .evaluate(toolkit.model, config, samples)
        .map_err(|source| EngineError::Solver {
            phase: "penalties",
            source,
        })?;
    penalties.write_tsv(&config.penalties_path())?;
    record.mark(PhaseState::Complete)?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::table::Table;
    use crate::engine::config::ConfigError;
    use crate::engine::dispatch::{BatchScheduler, JobDescription};
    use crate::engine::progress::testing::recording_reporter;
    use crate::engine::runner::sample_directory;
    use crate::engine::solver::testing::{Failure, ScriptedOptimizer, UniformPenalties, toy_model};
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        config: RunConfig,
    }

    impl Fixture {
        fn new(samples: usize) -> Self {
            let dir = tempdir().unwrap();
            let data = dir.path().join("expression.tsv");
            let header = (0..samples).map(|i| format!("cell{i}")).join("\t");
            let values = (0..samples).map(|i| i.to_string()).join("\t");
            fs::write(&data, format!("gene\t{header}\nG0\t{values}\n")).unwrap();
            let config = RunConfig {
                data: vec![data],
                model: "TOY".into(),
                output_dir: dir.path().join("out"),
                num_processes: Some(2),
                ..RunConfig::default()
            };
            Self { _dir: dir, config }
        }

        fn temp(&self) -> PathBuf {
            self.config.temp_root()
        }
    }

    fn run_with(
        config: &RunConfig,
        optimizer: &ScriptedOptimizer,
        penalties: &UniformPenalties,
    ) -> Result<RunOutcome, EngineError> {
        let model = toy_model(6, 3);
        let toolkit = Toolkit {
            model: &model,
            optimizer,
            penalty_model: penalties,
            dispatcher: None,
        };
        run(config, &toolkit, &ProgressReporter::new())
    }

    #[test]
    fn fresh_run_builds_cache_evaluates_penalties_and_collects() {
        let fixture = Fixture::new(3);
        let optimizer = ScriptedOptimizer::default();
        let penalties = UniformPenalties::default();

        let outcome = run_with(&fixture.config, &optimizer, &penalties).unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(ref artifacts) if artifacts.len() == 2));
        assert!(!optimizer.reaction_calls.lock().unwrap().is_empty());
        assert_eq!(*penalties.calls.lock().unwrap(), 1);
        assert!(PhaseRecord::penalties(&fixture.temp()).is_complete().unwrap());
        assert!(fixture.temp().join("penalties.txt.gz").is_file());

        let cache = PrecacheStore::new(fixture.config.cache_root())
            .load(&fixture.config.model_key())
            .unwrap();
        assert_eq!(cache.len(), 9);

        let reactions = Table::read_tsv(&fixture.config.output_dir.join("reactions.tsv")).unwrap();
        assert_eq!(reactions.columns(), ["cell0", "cell1", "cell2"]);
        assert_eq!(reactions.len(), 6);
        assert_eq!(reactions.get("R1", "cell2"), Some(201.0));
        assert!(fixture.config.output_dir.join("model.json.gz").is_file());
    }

    #[test]
    fn second_run_resumes_without_recomputing_completed_phases() {
        let fixture = Fixture::new(2);
        run_with(
            &fixture.config,
            &ScriptedOptimizer::default(),
            &UniformPenalties::default(),
        )
        .unwrap();

        let optimizer = ScriptedOptimizer::default();
        let penalties = UniformPenalties::default();
        let (reporter, events) = recording_reporter();
        let model = toy_model(6, 3);
        let toolkit = Toolkit {
            model: &model,
            optimizer: &optimizer,
            penalty_model: &penalties,
            dispatcher: None,
        };
        run(&fixture.config, &toolkit, &reporter).unwrap();

        assert!(optimizer.reaction_calls.lock().unwrap().is_empty());
        assert_eq!(*penalties.calls.lock().unwrap(), 0);
        assert!(
            events
                .lock()
                .unwrap()
                .contains(&Progress::PhaseSkipped { name: "Penalties" })
        );
    }

    #[test]
    fn failing_sample_stops_the_batch() {
        let fixture = Fixture::new(4);
        let config = RunConfig {
            num_processes: Some(1),
            ..fixture.config.clone()
        };
        let optimizer = ScriptedOptimizer::failing(2, Failure::Solver);

        let result = run_with(&config, &optimizer, &UniformPenalties::default());

        match result {
            Err(EngineError::CrossBoundary { sample, message }) => {
                assert_eq!(sample, 2);
                assert_eq!(message, "Infeasible model");
            }
            other => panic!("expected a cross-boundary error, got {other:?}"),
        }
        assert_eq!(*optimizer.scored.lock().unwrap(), [0, 1, 2]);
        assert!(!sample_directory(&fixture.temp(), 3).exists());
        assert!(!config.output_dir.join("reactions.tsv").exists());
    }

    #[test]
    fn collect_mode_tolerates_missing_samples() {
        let fixture = Fixture::new(3);
        let optimizer = ScriptedOptimizer::default();
        let model = toy_model(6, 3);
        for index in [0, 2] {
            let task = SampleTask::new(index, format!("cell{index}"), Arc::new(fixture.config.clone()));
            SampleRunner::new(&model, &optimizer).run(&task).unwrap();
        }
        let config = RunConfig {
            collect: true,
            ..fixture.config.clone()
        };

        let outcome = run_with(&config, &optimizer, &UniformPenalties::default()).unwrap();

        assert!(matches!(outcome, RunOutcome::Collected(_)));
        let reactions = Table::read_tsv(&config.output_dir.join("reactions.tsv")).unwrap();
        assert_eq!(reactions.columns(), ["cell0", "cell1", "cell2"]);
        assert_eq!(reactions.get("R3", "cell0"), Some(3.0));
        assert_eq!(reactions.get("R3", "cell1"), None);
        assert_eq!(reactions.get("R3", "cell2"), Some(203.0));
    }

    #[test]
    fn single_sample_mode_scores_only_that_sample() {
        let fixture = Fixture::new(3);
        let config = RunConfig {
            single_sample: Some(1),
            ..fixture.config.clone()
        };
        let optimizer = ScriptedOptimizer::default();
        let penalties = UniformPenalties::default();

        let outcome = run_with(&config, &optimizer, &penalties).unwrap();

        match outcome {
            RunOutcome::SingleSample(result) => {
                assert_eq!(result.index, 1);
                assert_eq!(result.name, "cell1");
            }
            other => panic!("expected a single-sample outcome, got {other:?}"),
        }
        assert_eq!(*optimizer.scored.lock().unwrap(), [1]);
        assert_eq!(*penalties.calls.lock().unwrap(), 0);
    }

    #[test]
    fn single_sample_out_of_range_is_rejected() {
        let fixture = Fixture::new(2);
        let config = RunConfig {
            single_sample: Some(5),
            ..fixture.config.clone()
        };

        let result = run_with(&config, &ScriptedOptimizer::default(), &UniformPenalties::default());

        assert!(matches!(
            result,
            Err(EngineError::SampleOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn precache_without_data_stops_after_the_cache() {
        let dir = tempdir().unwrap();
        let config = RunConfig {
            model: "TOY".into(),
            output_dir: dir.path().to_path_buf(),
            precache: true,
            num_processes: Some(2),
            ..RunConfig::default()
        };
        let penalties = UniformPenalties::default();

        let outcome = run_with(&config, &ScriptedOptimizer::default(), &penalties).unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Precached {
                entries: 9,
                rebuilt: true
            }
        );
        assert_eq!(*penalties.calls.lock().unwrap(), 0);
        assert!(!config.temp_root().exists());
    }

    #[test]
    fn list_genes_writes_the_gene_union() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("genes.txt");
        let config = RunConfig {
            list_genes: Some(path.clone()),
            output_dir: dir.path().to_path_buf(),
            ..RunConfig::default()
        };
        let optimizer = ScriptedOptimizer::default();

        let outcome = run_with(&config, &optimizer, &UniformPenalties::default()).unwrap();

        assert_eq!(outcome, RunOutcome::GenesListed { path: path.clone(), count: 3 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "G0\nG1\nG2");
        assert!(optimizer.reaction_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_configuration_fails_before_any_work() {
        let fixture = Fixture::new(2);
        let config = RunConfig {
            lambda: 1.5,
            ..fixture.config.clone()
        };
        let optimizer = ScriptedOptimizer::default();

        let result = run_with(&config, &optimizer, &UniformPenalties::default());

        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::OutOfRange { name: "lambda", .. }))
        ));
        assert!(optimizer.reaction_calls.lock().unwrap().is_empty());
        assert!(!config.cache_root().exists());
    }

    #[derive(Default)]
    struct RecordingScheduler {
        jobs: Arc<Mutex<Vec<JobDescription>>>,
    }

    impl BatchScheduler for RecordingScheduler {
        fn submit(&self, job: &JobDescription) -> Result<String, EngineError> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(format!("job{}", job.sample))
        }
    }

    #[test]
    fn queue_mode_dispatches_after_penalties_without_scoring() {
        let fixture = Fixture::new(3);
        let config = RunConfig {
            torque_queue: Some("batch".into()),
            ..fixture.config.clone()
        };
        let scheduler = RecordingScheduler::default();
        let jobs = scheduler.jobs.clone();
        let dispatcher = QueueDispatcher::new(Box::new(scheduler), "compass");
        let model = toy_model(6, 3);
        let optimizer = ScriptedOptimizer::default();
        let penalties = UniformPenalties::default();
        let toolkit = Toolkit {
            model: &model,
            optimizer: &optimizer,
            penalty_model: &penalties,
            dispatcher: Some(&dispatcher),
        };

        let outcome = run(&config, &toolkit, &ProgressReporter::new()).unwrap();

        match outcome {
            RunOutcome::Dispatched(receipt) => {
                assert_eq!(receipt.job_ids, ["job0", "job1", "job2"]);
            }
            other => panic!("expected a dispatch outcome, got {other:?}"),
        }
        assert_eq!(jobs.lock().unwrap().len(), 3);
        assert_eq!(*penalties.calls.lock().unwrap(), 1);
        assert!(optimizer.scored.lock().unwrap().is_empty());
    }

    #[test]
    fn queue_mode_without_dispatcher_is_an_error() {
        let fixture = Fixture::new(1);
        let config = RunConfig {
            torque_queue: Some("batch".into()),
            ..fixture.config.clone()
        };

        let result = run_with(&config, &ScriptedOptimizer::default(), &UniformPenalties::default());

        assert!(matches!(result, Err(EngineError::Initialization(_))));
    }
}
