//! CLI `re-embed` command: regenerate every embedding with the configured provider.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use cortex::app::App;

const BATCH_SIZE: usize = 32;

pub async fn re_embed(app: &App) -> Result<()> {
    let embedding = &app.config.embedding;
    println!(
        "Re-embedding all facts with '{}' ({} dimensions)...",
        embedding.model, embedding.dimensions
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {pos} facts embedded ({elapsed})")
            .context("invalid progress template")?,
    );

    let count = app
        .facts
        .re_embed(BATCH_SIZE, |n| pb.inc(n as u64))
        .await
        .context("re-embedding failed; the previous embeddings are unchanged")?;

    pb.finish_and_clear();
    println!("Re-embedded {count} fact(s) with '{}'.", embedding.model);
    Ok(())
}
