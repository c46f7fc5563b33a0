use super::error::EngineError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

const OUT_LOG: &str = "out.log";
const ERR_LOG: &str = "err.log";

/// Per-sample log files that capture everything logged on the current thread while
/// a [`SampleLogSink::scope`] is active.
///
/// `out.log` receives DEBUG and above, `err.log` WARN and above.
#[derive(Debug)]
pub struct SampleLogSink {
    out: Arc<File>,
    err: Arc<File>,
    out_path: PathBuf,
    err_path: PathBuf,
}

impl SampleLogSink {
    pub fn create(dir: &Path) -> Result<Self, EngineError> {
        let out_path = dir.join(OUT_LOG);
        let err_path = dir.join(ERR_LOG);
        let out = File::create(&out_path).map_err(|e| EngineError::io(&out_path, e))?;
        let err = File::create(&err_path).map_err(|e| EngineError::io(&err_path, e))?;
        Ok(Self {
            out: Arc::new(out),
            err: Arc::new(err),
            out_path,
            err_path,
        })
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub fn err_path(&self) -> &Path {
        &self.err_path
    }

    /// Runs `f` with this sink as the thread's default subscriber.
    ///
    /// The previous subscriber is restored when `f` returns or unwinds.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let out_layer = fmt::layer()
            .with_writer(self.out.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::DEBUG);
        let err_layer = fmt::layer()
            .with_writer(self.err.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::WARN);
        let subscriber = tracing_subscriber::registry()
            .with(out_layer)
            .with(err_layer);

        tracing::subscriber::with_default(subscriber, f)
    }
}
