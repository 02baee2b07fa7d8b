//! CLI argument merging with file-loaded config: an all-`Option` overrides
//! struct that replaces fields on the base config when present.

use std::path::PathBuf;

use super::PipelineConfig;

#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub jobs: Option<usize>,
    pub flat: Option<bool>,
    pub verbose: Option<bool>,
    pub output_dir: Option<PathBuf>,
}

pub fn merge_cli_with_config(mut base: PipelineConfig, cli: CliOverrides) -> PipelineConfig {
    if let Some(jobs) = cli.jobs {
        base.jobs = Some(jobs);
    }
    if let Some(flat) = cli.flat {
        base.flat = flat;
    }
    if let Some(verbose) = cli.verbose {
        base.verbose = verbose;
    }
    if let Some(output_dir) = cli.output_dir {
        base.output_dir = Some(output_dir);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::{merge_cli_with_config, CliOverrides};
    use crate::config::PipelineConfig;
    use std::path::PathBuf;

    #[test]
    fn cli_overrides_replace_base_values() {
        let base = PipelineConfig { flat: false, ..PipelineConfig::default() };
        let cli = CliOverrides {
            flat: Some(true),
            output_dir: Some(PathBuf::from("/tmp/out")),
            ..CliOverrides::default()
        };

        let merged = merge_cli_with_config(base, cli);
        assert!(merged.flat);
        assert_eq!(merged.output_dir, Some(PathBuf::from("/tmp/out")));
        assert!(merged.copy_media, "unset fields keep the base default");
    }
}
