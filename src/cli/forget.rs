//! CLI `forget` command: erase a user's facts after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use cortex::app::App;
use cortex::memory::types::Category;

pub async fn forget(app: &App, user: &str, keep: &[Category], yes: bool) -> Result<()> {
    if !yes {
        let kept = if keep.is_empty() {
            "none".to_string()
        } else {
            keep.iter().map(Category::as_str).collect::<Vec<_>>().join(", ")
        };
        println!("WARNING: This will permanently delete the stored facts of user '{user}'.");
        println!("Categories kept: {kept}");
        print!("\nType YES to confirm: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if input.trim() != "YES" {
            bail!("forget cancelled");
        }
    }

    let deleted = app.facts.delete_for_user(user, keep).await?;
    println!("Deleted {deleted} fact(s) for '{user}'.");
    Ok(())
}
