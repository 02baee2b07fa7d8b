//! Default-command implementation: run the full pipeline over one archive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::archive;
use crate::citation;
use crate::config::{load_config, merge_cli_with_config, CliOverrides};
use crate::domain::ResolverStats;
use crate::error::AppError;
use crate::index;
use crate::load;
use crate::output;
use crate::resolve;

use super::utils::default_output_dir;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the input archive (standard ZIP; nested ZIP at arbitrary depth)
    pub archive: PathBuf,

    /// Directory for the generated corpus; defaults to `<archive-stem>_corpus`
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Omit the `_with_media`/`_with_assets` link directories
    #[arg(long)]
    pub flat: bool,

    /// Number of worker threads for indexing and resolution
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Path to a config file (export-to-corpus.toml or .export-to-corpus.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

pub fn run(args: RunArgs, verbose: bool) -> Result<()> {
    let start_time = Instant::now();

    if !args.archive.exists() {
        anyhow::bail!("archive not found: {}", args.archive.display());
    }

    let anchor_dir = args.archive.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));
    let file_config = load_config(&anchor_dir, args.config.as_deref())?;
    let cli_overrides = CliOverrides {
        jobs: args.jobs,
        flat: Some(args.flat),
        verbose: Some(verbose),
        output_dir: args.output_dir.clone(),
    };
    let merged = merge_cli_with_config(file_config, cli_overrides);

    if let Some(jobs) = merged.jobs {
        let _ = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global();
    }

    let output_dir = merged.output_dir.clone().unwrap_or_else(|| default_output_dir(&args.archive));
    if output_dir.exists() && std::fs::read_dir(&output_dir).map(|mut d| d.next().is_some()).unwrap_or(false) {
        return Err(AppError::OutputConflict { path: output_dir }.into());
    }
    std::fs::create_dir_all(&output_dir)
        .map_err(|e| AppError::OutputUnwritable { path: output_dir.clone(), source: e })?;

    // Retained (not torn down on success) under the output tree so
    // `rematch-media` can re-run resolution without re-unpacking.
    let extraction_root = output_dir.join(".extraction_cache");
    std::fs::create_dir_all(&extraction_root)
        .map_err(|e| AppError::OutputUnwritable { path: extraction_root.clone(), source: e })?;

    let spinner = new_spinner("unpacking archive...");
    let outcome = archive::extract_tree(&args.archive, &extraction_root, merged.max_archive_depth)?;
    for skipped in &outcome.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "nested archive skipped");
    }
    spinner.finish_with_message(format!("{} archives extracted", outcome.archives_extracted));
    info!(archives = outcome.archives_extracted, "archive extraction complete");

    let recovered_dir = anchor_dir.join("recovered_files");
    let recovered_dir = recovered_dir.is_dir().then_some(recovered_dir);

    let spinner = new_spinner("indexing media...");
    let mut media_index = index::build_index(&extraction_root, recovered_dir.as_deref(), &merged.media_extensions);
    spinner.finish_with_message(format!("{} media files indexed", media_index.files.len()));

    let mut conversations = load::load_conversations(&extraction_root);
    conversations.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
    info!(count = conversations.len(), "conversations discovered");

    let per_conversation_citations: Vec<Vec<crate::domain::Citation>> = conversations
        .iter()
        .map(|c| citation::extract_citations(&c.conversation_id, &c.mapping))
        .collect();
    let all_citations: Vec<crate::domain::Citation> =
        per_conversation_citations.iter().flatten().cloned().collect();

    resolve::prepare_size_gen_id_index(&mut media_index, &all_citations);
    let mut stats = ResolverStats::default();
    stats.media_index_collisions = media_index.collisions;
    let media_index = Arc::new(media_index);

    let progress = ProgressBar::new(conversations.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} conversations resolved")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let processed: Vec<Result<(crate::domain::ConversationDescriptor, ResolverStats), AppError>> = conversations
        .par_iter()
        .zip(per_conversation_citations.par_iter())
        .enumerate()
        .map(|(i, (conversation, citations))| {
            let (resolution, conv_stats) =
                resolve::resolve_conversation(&media_index, &conversation.conversation_id, citations);
            let assets = crate::asset::extract_assets(&conversation.mapping);

            let mut normalized = conversation.clone();
            normalized.resolved_media = resolution.resolved_media;
            normalized.unresolved_citations = resolution.unresolved;
            normalized.assets = assets;

            let descriptor =
                output::write_conversation(&output_dir, &normalized, &resolution.citation_bindings, i + 1)?;
            progress.inc(1);
            Ok((descriptor, conv_stats))
        })
        .collect();
    progress.finish_and_clear();

    let mut descriptors = Vec::with_capacity(processed.len());
    for result in processed {
        let (descriptor, conv_stats) = result?;
        descriptors.push(descriptor);
        stats.merge(conv_stats);
    }

    let processing_time = start_time.elapsed().as_secs_f64();
    output::write_master_index(
        &output_dir,
        descriptors,
        stats,
        processing_time,
        Some(extraction_root),
        merged.flat,
    )?;

    eprintln!(
        "{} corpus written to {} in {:.2}s",
        style("done").green().bold(),
        output_dir.display(),
        processing_time
    );
    info!(elapsed_seconds = processing_time, "pipeline complete");
    Ok(())
}

fn new_spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}
