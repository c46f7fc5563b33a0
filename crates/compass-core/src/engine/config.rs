use crate::core::model::ModelKey;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod defaults {
    pub const MODEL: &str = "RECON2_mat";
    pub const SPECIES: &str = "homo_sapiens";
    pub const SUPPORTED_SPECIES: [&str; 2] = ["homo_sapiens", "mus_musculus"];
    pub const NUM_THREADS: usize = 1;
    pub const LAMBDA: f64 = 0.0;
    pub const SOLVER: &str = "compass-solver";
    pub const TEMP_DIR_NAME: &str = "_tmp";
    pub const CACHE_DIR_NAME: &str = "_cache";
    pub const PENALTIES_FILE_NAME: &str = "penalties.txt.gz";
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Parameter '{name}' is {value}, expected {expected}")]
    OutOfRange {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Incompatible options: {0}")]
    Incompatible(String),

    #[error("Cannot resolve path '{path}': {message}", path = path.display())]
    InvalidPath { path: PathBuf, message: String },
}

/// The global configuration of one run.
///
/// Serializable so that remotely dispatched jobs can be started with exactly the
/// configuration of the orchestrating run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub data: Vec<PathBuf>,
    pub model: String,
    pub model_dir: PathBuf,
    pub species: String,
    pub media: Option<String>,
    pub output_dir: PathBuf,
    /// Defaults to `<output_dir>/_tmp` when unset.
    pub temp_dir: Option<PathBuf>,
    /// Defaults to `<output_dir>/_cache` when unset.
    pub cache_dir: Option<PathBuf>,
    pub torque_queue: Option<String>,
    pub num_processes: Option<usize>,
    pub lambda: f64,
    pub single_sample: Option<usize>,
    pub generate_cache: bool,
    pub collect: bool,
    pub precache: bool,
    pub num_threads: usize,
    pub no_reactions: bool,
    pub calc_metabolites: bool,
    pub penalties_file: Option<PathBuf>,
    pub solver: PathBuf,
    pub list_genes: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            model: defaults::MODEL.to_string(),
            model_dir: PathBuf::from("."),
            species: defaults::SPECIES.to_string(),
            media: None,
            output_dir: PathBuf::from("."),
            temp_dir: None,
            cache_dir: None,
            torque_queue: None,
            num_processes: None,
            lambda: defaults::LAMBDA,
            single_sample: None,
            generate_cache: false,
            collect: false,
            precache: false,
            num_threads: defaults::NUM_THREADS,
            no_reactions: false,
            calc_metabolites: false,
            penalties_file: None,
            solver: PathBuf::from(defaults::SOLVER),
            list_genes: None,
        }
    }
}

impl RunConfig {
    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(&self.model, &self.species, self.media.clone())
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(defaults::TEMP_DIR_NAME))
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(defaults::CACHE_DIR_NAME))
    }

    pub fn penalties_path(&self) -> PathBuf {
        self.penalties_file
            .clone()
            .unwrap_or_else(|| self.temp_root().join(defaults::PENALTIES_FILE_NAME))
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Checks flag combinations and value ranges. Runs before any work is dispatched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_data() && !self.precache && self.list_genes.is_none() {
            return Err(ConfigError::MissingParameter("data"));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(ConfigError::OutOfRange {
                name: "lambda",
                value: self.lambda.to_string(),
                expected: "a value between 0 and 1",
            });
        }
        if self.num_processes == Some(0) {
            return Err(ConfigError::OutOfRange {
                name: "num_processes",
                value: "0".to_string(),
                expected: "at least 1",
            });
        }
        if self.num_threads == 0 {
            return Err(ConfigError::OutOfRange {
                name: "num_threads",
                value: "0".to_string(),
                expected: "at least 1",
            });
        }
        if !defaults::SUPPORTED_SPECIES.contains(&self.species.as_str()) {
            return Err(ConfigError::OutOfRange {
                name: "species",
                value: self.species.clone(),
                expected: "one of homo_sapiens, mus_musculus",
            });
        }
        if self.generate_cache && (self.no_reactions || !self.calc_metabolites) {
            return Err(ConfigError::Incompatible(
                "generate_cache cannot be combined with no_reactions or without calc_metabolites"
                    .to_string(),
            ));
        }
        if self.single_sample.is_some() && self.collect {
            return Err(ConfigError::Incompatible(
                "single_sample and collect select different run modes".to_string(),
            ));
        }
        Ok(())
    }

    /// Makes every filesystem path absolute relative to the current directory.
    ///
    /// The solver is left untouched when it is a bare program name, so it is still
    /// looked up on `PATH`.
    pub fn into_absolute(mut self) -> Result<Self, ConfigError> {
        self.data = self
            .data
            .iter()
            .map(|p| absolute(p))
            .collect::<Result<_, _>>()?;
        self.model_dir = absolute(&self.model_dir)?;
        self.output_dir = absolute(&self.output_dir)?;
        self.temp_dir = self.temp_dir.as_deref().map(absolute).transpose()?;
        self.cache_dir = self.cache_dir.as_deref().map(absolute).transpose()?;
        self.penalties_file = self.penalties_file.as_deref().map(absolute).transpose()?;
        self.list_genes = self.list_genes.as_deref().map(absolute).transpose()?;
        if self.solver.components().count() > 1 {
            self.solver = absolute(&self.solver)?;
        }
        Ok(self)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::InvalidPath {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// A partial run configuration read from a configuration file.
///
/// Every present entry overwrites the same-named value of the configuration it is
/// applied to; absent entries leave it untouched. For optional settings an explicit
/// `null` is present too, and clears the value (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfigOverlay {
    pub data: Option<Vec<PathBuf>>,
    pub model: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub species: Option<String>,
    #[serde(deserialize_with = "present")]
    pub media: Option<Option<String>>,
    pub output_dir: Option<PathBuf>,
    #[serde(deserialize_with = "present")]
    pub temp_dir: Option<Option<PathBuf>>,
    #[serde(deserialize_with = "present")]
    pub cache_dir: Option<Option<PathBuf>>,
    #[serde(deserialize_with = "present")]
    pub torque_queue: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub num_processes: Option<Option<usize>>,
    pub lambda: Option<f64>,
    #[serde(deserialize_with = "present")]
    pub single_sample: Option<Option<usize>>,
    pub generate_cache: Option<bool>,
    pub collect: Option<bool>,
    pub precache: Option<bool>,
    pub num_threads: Option<usize>,
    pub no_reactions: Option<bool>,
    pub calc_metabolites: Option<bool>,
    #[serde(deserialize_with = "present")]
    pub penalties_file: Option<Option<PathBuf>>,
    pub solver: Option<PathBuf>,
    #[serde(deserialize_with = "present")]
    pub list_genes: Option<Option<PathBuf>>,
}

/// Distinguishes an explicit `null` from a missing entry.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RunConfigOverlay {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply(self, config: &mut RunConfig) {
        let RunConfigOverlay {
            data,
            model,
            model_dir,
            species,
            media,
            output_dir,
            temp_dir,
            cache_dir,
            torque_queue,
            num_processes,
            lambda,
            single_sample,
            generate_cache,
            collect,
            precache,
            num_threads,
            no_reactions,
            calc_metabolites,
            penalties_file,
            solver,
            list_genes,
        } = self;

        macro_rules! overwrite {
            ($target:ident; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $field {
                    $target.$field = value;
                })*
            };
        }
        overwrite!(
            config;
            data,
            model,
            model_dir,
            species,
            output_dir,
            lambda,
            generate_cache,
            collect,
            precache,
            num_threads,
            no_reactions,
            calc_metabolites,
            solver,
            media,
            temp_dir,
            cache_dir,
            torque_queue,
            num_processes,
            single_sample,
            penalties_file,
            list_genes,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_data() -> RunConfig {
        RunConfig {
            data: vec![PathBuf::from("expression.tsv")],
            ..RunConfig::default()
        }
    }

    #[test]
    fn default_config_with_data_is_valid() {
        assert_eq!(config_with_data().validate(), Ok(()));
    }

    #[test]
    fn data_is_required_unless_precaching_or_listing_genes() {
        let mut config = RunConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingParameter("data"))
        );

        config.precache = true;
        assert_eq!(config.validate(), Ok(()));

        config.precache = false;
        config.list_genes = Some(PathBuf::from("genes.txt"));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn lambda_outside_unit_interval_is_rejected() {
        let mut config = config_with_data();
        config.lambda = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "lambda", .. })
        ));
        config.lambda = -0.1;
        assert!(config.validate().is_err());
        config.lambda = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn generate_cache_requires_reactions_and_metabolites() {
        let mut config = config_with_data();
        config.generate_cache = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Incompatible(_))
        ));

        config.calc_metabolites = true;
        assert!(config.validate().is_ok());

        config.no_reactions = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Incompatible(_))
        ));
    }

    #[test]
    fn zero_workers_or_threads_are_rejected() {
        let mut config = config_with_data();
        config.num_processes = Some(0);
        assert!(config.validate().is_err());

        let mut config = config_with_data();
        config.num_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unsupported_species_is_rejected() {
        let mut config = config_with_data();
        config.species = "danio_rerio".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "species", .. })
        ));
    }

    #[test]
    fn single_sample_and_collect_are_exclusive() {
        let mut config = config_with_data();
        config.single_sample = Some(0);
        config.collect = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Incompatible(_))
        ));
    }

    #[test]
    fn temp_and_cache_roots_default_under_output_dir() {
        let mut config = config_with_data();
        config.output_dir = PathBuf::from("/runs/a");

        assert_eq!(config.temp_root(), PathBuf::from("/runs/a/_tmp"));
        assert_eq!(config.cache_root(), PathBuf::from("/runs/a/_cache"));
        assert_eq!(
            config.penalties_path(),
            PathBuf::from("/runs/a/_tmp/penalties.txt.gz")
        );

        config.temp_dir = Some(PathBuf::from("/scratch"));
        assert_eq!(config.temp_root(), PathBuf::from("/scratch"));
    }

    #[test]
    fn into_absolute_keeps_bare_solver_name() {
        let config = RunConfig {
            output_dir: PathBuf::from("out"),
            ..config_with_data()
        }
        .into_absolute()
        .unwrap();

        assert!(config.output_dir.is_absolute());
        assert!(config.data[0].is_absolute());
        assert_eq!(config.solver, PathBuf::from(defaults::SOLVER));
    }

    #[test]
    fn overlay_overwrites_only_present_entries() {
        let mut config = config_with_data();
        config.num_processes = Some(4);
        config.torque_queue = Some("batch".into());

        let overlay = RunConfigOverlay::from_json(
            r#"{"model": "RECON1_mat", "num_processes": 2, "calc_metabolites": true}"#,
        )
        .unwrap();
        overlay.apply(&mut config);

        assert_eq!(config.model, "RECON1_mat");
        assert_eq!(config.num_processes, Some(2));
        assert!(config.calc_metabolites);
        assert_eq!(config.torque_queue.as_deref(), Some("batch"));
        assert_eq!(config.data, vec![PathBuf::from("expression.tsv")]);
    }

    #[test]
    fn explicit_null_clears_an_optional_setting() {
        let mut config = config_with_data();
        config.media = Some("rich".into());
        config.single_sample = Some(3);

        let overlay =
            RunConfigOverlay::from_json(r#"{"media": null, "single_sample": null}"#).unwrap();
        assert_eq!(overlay.media, Some(None));
        assert_eq!(overlay.temp_dir, None);
        overlay.apply(&mut config);

        assert_eq!(config.media, None);
        assert_eq!(config.single_sample, None);
        assert_eq!(config.data, vec![PathBuf::from("expression.tsv")]);
    }

    #[test]
    fn overlay_reads_toml_documents() {
        let overlay = RunConfigOverlay::from_toml(
            "species = \"mus_musculus\"\nlambda = 0.25\ntorque_queue = \"batch\"\n",
        )
        .unwrap();
        let mut config = config_with_data();
        overlay.apply(&mut config);

        assert_eq!(config.species, "mus_musculus");
        assert_eq!(config.lambda, 0.25);
        assert_eq!(config.torque_queue.as_deref(), Some("batch"));
    }

    #[test]
    fn overlay_rejects_unknown_keys() {
        assert!(RunConfigOverlay::from_json(r#"{"num_procs": 2}"#).is_err());
    }

    #[test]
    fn serialized_config_round_trips_through_overlay() {
        let mut original = config_with_data();
        original.media = Some("rich".into());
        original.num_processes = Some(8);
        original.calc_metabolites = true;
        let json = serde_json::to_string(&original).unwrap();

        let mut restored = RunConfig::default();
        RunConfigOverlay::from_json(&json).unwrap().apply(&mut restored);

        assert_eq!(restored, original);
    }
}
