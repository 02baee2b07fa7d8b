//! Pipeline configuration: defaults, file loading, and CLI-override merging.

pub mod merge;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Format, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub use merge::{merge_cli_with_config, CliOverrides};

/// Tunables left as bare constants or prose elsewhere. All have sensible
/// defaults and are overridable via config file or CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_media_extensions")]
    pub media_extensions: HashSet<String>,

    /// Guard against pathological archive nesting; nested archives can unpack
    /// to arbitrary depth, this bounds runaway recursion.
    #[serde(default = "default_max_archive_depth")]
    pub max_archive_depth: usize,

    /// Number of rayon worker threads. `None` uses rayon's own default
    /// (logical CPU count).
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Omit `_with_media`/`_with_assets` link directories from the output
    /// tree (CLI `--flat`).
    #[serde(default)]
    pub flat: bool,

    /// Copy matched media into each conversation's `media/` directory.
    /// When false, symlink instead — diagnostic only, never the default,
    /// since copies keep output directories valid after the extraction
    /// working directory is torn down.
    #[serde(default = "default_true")]
    pub copy_media: bool,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            media_extensions: default_media_extensions(),
            max_archive_depth: default_max_archive_depth(),
            jobs: None,
            flat: false,
            copy_media: true,
            output_dir: None,
            verbose: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_archive_depth() -> usize {
    64
}

fn default_media_extensions() -> HashSet<String> {
    crate::domain::media_extensions().iter().map(|s| s.to_string()).collect()
}

/// Load a `PipelineConfig` from an optional explicit config file, falling
/// back to `export-to-corpus.toml`/`.export-to-corpus.yml` next to the input
/// archive.
pub fn load_config(anchor_dir: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut figment = Figment::new().merge(figment::providers::Serialized::defaults(
        PipelineConfig::default(),
    ));

    if let Some(path) = explicit {
        figment = merge_file(figment, path)?;
    } else {
        for candidate in [
            anchor_dir.join("export-to-corpus.toml"),
            anchor_dir.join(".export-to-corpus.yml"),
            anchor_dir.join(".export-to-corpus.yaml"),
        ] {
            if candidate.exists() {
                figment = merge_file(figment, &candidate)?;
                break;
            }
        }
    }

    figment.extract().context("failed to load pipeline configuration")
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    Ok(match ext {
        "yml" | "yaml" => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    })
}
