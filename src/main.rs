//! export-to-corpus: resolves media references in a ChatGPT conversation
//! export into a deduplicated, browsable corpus.

mod archive;
mod asset;
mod citation;
mod cli;
mod config;
mod domain;
mod error;
mod index;
mod load;
mod output;
mod resolve;
mod utils;

use error::AppError;

/// Exit 0 on success, 2 on malformed input, 1 on any other fatal failure.
fn main() {
    if let Err(err) = cli::run() {
        eprintln!("error: {err:#}");
        let code = match err.downcast_ref::<AppError>() {
            Some(AppError::ArchiveMalformed { .. }) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
