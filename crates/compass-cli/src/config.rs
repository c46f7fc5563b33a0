use crate::cli::Cli;
use crate::error::{CliError, Result};
use compass::engine::config::{RunConfig, RunConfigOverlay};
use std::path::Path;
use tracing::debug;

/// Builds the run configuration: library defaults, then command-line values, then
/// the entries of `--config-file`. Paths are made absolute and the result validated.
pub fn build_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = RunConfig::default();
    apply_cli(cli, &mut config);

    if let Some(path) = &cli.config_file {
        load_overlay(path)?.apply(&mut config);
    }

    let config = config.into_absolute()?;
    config.validate()?;
    Ok(config)
}

fn apply_cli(cli: &Cli, config: &mut RunConfig) {
    if !cli.data.is_empty() {
        config.data = cli.data.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(species) = &cli.species {
        config.species = species.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(lambda) = cli.lambda {
        config.lambda = lambda;
    }
    if let Some(num_threads) = cli.num_threads {
        config.num_threads = num_threads;
    }
    if let Some(solver) = &cli.solver {
        config.solver = solver.clone();
    }

    config.media = cli.media.clone();
    config.temp_dir = cli.temp_dir.clone();
    config.cache_dir = cli.cache_dir.clone();
    config.torque_queue = cli.torque_queue.clone();
    config.num_processes = cli.num_processes;
    config.single_sample = cli.single_sample;
    config.list_genes = cli.list_genes.clone();

    config.no_reactions = cli.no_reactions;
    config.calc_metabolites = cli.calc_metabolites;
    config.precache = cli.precache;
    config.collect = cli.collect;
    config.generate_cache = cli.generate_cache;
}

/// Reads a configuration file as TOML when its extension is `.toml`, as JSON otherwise.
pub fn load_overlay(path: &Path) -> Result<RunConfigOverlay> {
    debug!("Loading configuration from file: {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let parse_error = |source: anyhow::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source,
    };
    if path.extension().is_some_and(|ext| ext == "toml") {
        RunConfigOverlay::from_toml(&content).map_err(|e| parse_error(e.into()))
    } else {
        RunConfigOverlay::from_json(&content).map_err(|e| parse_error(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use compass::engine::config::ConfigError;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("compass").chain(args.iter().copied()))
    }

    #[test]
    fn cli_values_override_defaults() {
        let dir = tempdir().unwrap();
        let output = dir.path().to_str().unwrap();
        let cli = parse(&[
            "--data",
            "expr.tsv",
            "--output-dir",
            output,
            "--species",
            "mus_musculus",
            "--lambda",
            "0.25",
            "--num-processes",
            "4",
        ]);

        let config = build_config(&cli).unwrap();

        assert_eq!(config.species, "mus_musculus");
        assert_eq!(config.lambda, 0.25);
        assert_eq!(config.num_processes, Some(4));
        assert_eq!(config.model, "RECON2_mat");
        assert!(config.data[0].is_absolute());
        assert_eq!(config.temp_root(), dir.path().join("_tmp"));
    }

    #[test]
    fn config_file_entries_win_over_cli_values() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("compass_config.json");
        fs::write(
            &file,
            r#"{"lambda": 0.5, "calc_metabolites": true, "media": "rich", "data": ["/data/expr.tsv"]}"#,
        )
        .unwrap();
        let cli = parse(&[
            "--data",
            "other.tsv",
            "--lambda",
            "0.1",
            "--config-file",
            file.to_str().unwrap(),
            "--single-sample",
            "3",
        ]);

        let config = build_config(&cli).unwrap();

        assert_eq!(config.lambda, 0.5);
        assert!(config.calc_metabolites);
        assert_eq!(config.media.as_deref(), Some("rich"));
        assert_eq!(config.data, [PathBuf::from("/data/expr.tsv")]);
        assert_eq!(config.single_sample, Some(3));
    }

    #[test]
    fn null_config_entries_clear_cli_values() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("compass_config.json");
        fs::write(&file, r#"{"media": null, "num_processes": null}"#).unwrap();
        let cli = parse(&[
            "--data",
            "expr.tsv",
            "--media",
            "rich",
            "--num-processes",
            "8",
            "--config-file",
            file.to_str().unwrap(),
        ]);

        let config = build_config(&cli).unwrap();

        assert_eq!(config.media, None);
        assert_eq!(config.num_processes, None);
    }

    #[test]
    fn toml_config_files_are_supported() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("compass.toml");
        fs::write(&file, "model = \"RECON1_mat\"\nnum_threads = 4\nprecache = true\n").unwrap();
        let cli = parse(&["--config-file", file.to_str().unwrap()]);

        let config = build_config(&cli).unwrap();

        assert_eq!(config.model, "RECON1_mat");
        assert_eq!(config.num_threads, 4);
        assert!(config.precache);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("compass_config.json");
        fs::write(&file, r#"{"lamda": 0.5}"#).unwrap();
        let cli = parse(&["--data", "expr.tsv", "--config-file", file.to_str().unwrap()]);

        let result = build_config(&cli);

        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let cli = parse(&["--data", "expr.tsv", "--lambda", "1.5"]);
        assert!(matches!(
            build_config(&cli),
            Err(CliError::Config(ConfigError::OutOfRange { name: "lambda", .. }))
        ));

        let cli = parse(&["--data", "expr.tsv", "--generate-cache"]);
        assert!(matches!(
            build_config(&cli),
            Err(CliError::Config(ConfigError::Incompatible(_)))
        ));
    }

    #[test]
    fn data_is_required_for_scoring() {
        let cli = parse(&[]);
        assert!(matches!(
            build_config(&cli),
            Err(CliError::Config(ConfigError::MissingParameter("data")))
        ));
    }
}
