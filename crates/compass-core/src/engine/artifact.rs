use super::config::RunConfig;
use std::fmt;

/// The per-sample score tables a run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Reactions,
    Secretions,
    Uptake,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Reactions, Self::Secretions, Self::Uptake];

    pub fn name(self) -> &'static str {
        match self {
            Self::Reactions => "reactions",
            Self::Secretions => "secretions",
            Self::Uptake => "uptake",
        }
    }

    /// File name inside a sample directory.
    pub fn sample_file_name(self) -> String {
        format!("{}.txt", self.name())
    }

    /// File name of the aggregated table inside the output directory.
    pub fn output_file_name(self) -> String {
        format!("{}.tsv", self.name())
    }

    pub fn is_enabled(self, config: &RunConfig) -> bool {
        match self {
            Self::Reactions => !config.no_reactions,
            Self::Secretions | Self::Uptake => config.calc_metabolites,
        }
    }

    pub fn enabled(config: &RunConfig) -> impl Iterator<Item = ArtifactKind> + '_ {
        Self::ALL.into_iter().filter(|kind| kind.is_enabled(config))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
