use crate::core::model::{MetabolicModel, ModelKey};
use crate::engine::error::EngineError;
use crate::engine::executor::WorkerPool;
use crate::engine::partition::{JobChunk, partition};
use crate::engine::precache::{FluxRange, PrecacheStore, RangeCache, merge_section};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::solver::{Optimizer, SolverError};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{info, instrument};

/// Returns the cached flux ranges for `key`, computing and storing them first when
/// nothing is stored yet or `force` is set.
///
/// The store is read once and written at most once. A rebuild always replaces the
/// stored entry as a whole.
#[instrument(skip_all, name = "precache_workflow", fields(key = %key))]
pub fn ensure(
    store: &PrecacheStore,
    key: &ModelKey,
    model: &dyn MetabolicModel,
    optimizer: &dyn Optimizer,
    pool: &WorkerPool,
    force: bool,
    reporter: &ProgressReporter,
) -> Result<(RangeCache, bool), EngineError> {
    let stored = store.load(key)?;
    if !stored.is_empty() && !force {
        info!(entries = stored.len(), "Flux range cache already built.");
        return Ok((stored, false));
    }

    info!(forced = force, "Building up flux range cache.");
    let cache = compute(model, optimizer, pool, reporter)?;
    store.save(key, &cache)?;
    Ok((cache, true))
}

/// Computes the flux range of every reaction and metabolite of `model`, splitting
/// each index space into one contiguous chunk per worker.
pub fn compute(
    model: &dyn MetabolicModel,
    optimizer: &dyn Optimizer,
    pool: &WorkerPool,
    reporter: &ProgressReporter,
) -> Result<RangeCache, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Precache" });

    let reactions = compute_section(
        "reaction",
        "reaction ranges",
        model.reaction_ids().len(),
        pool,
        reporter,
        |range| optimizer.reaction_ranges(model, range),
    )?;
    let metabolites = compute_section(
        "metabolite",
        "metabolite ranges",
        model.metabolite_ids().len(),
        pool,
        reporter,
        |range| optimizer.metabolite_ranges(model, range),
    )?;
    let cache = RangeCache {
        reactions,
        metabolites,
    };

    info!(
        reactions = cache.reactions.len(),
        metabolites = cache.metabolites.len(),
        "Flux ranges computed."
    );
    reporter.report(Progress::PhaseFinish);
    Ok(cache)
}

fn compute_section<F>(
    section: &'static str,
    label: &'static str,
    total: usize,
    pool: &WorkerPool,
    reporter: &ProgressReporter,
    solve: F,
) -> Result<BTreeMap<String, FluxRange>, EngineError>
where
    F: Fn(Range<usize>) -> Result<BTreeMap<String, FluxRange>, SolverError> + Sync,
{
    let chunks = partition(total, pool.workers())?;
    let completions = pool.run(
        label,
        chunks,
        |_, chunk: JobChunk| {
            if chunk.is_empty() {
                return Ok(BTreeMap::new());
            }
            solve(chunk.range()).map_err(|source| EngineError::Solver {
                phase: "precache",
                source,
            })
        },
        reporter,
    )?;

    // Chunks are disjoint index ranges, so an id reported twice with different
    // ranges means the model's index space is inconsistent.
    let mut ranges = BTreeMap::new();
    for completion in completions {
        merge_section(section, &mut ranges, completion.value)?;
    }
    Ok(ranges)
}
