use anyhow::Result;

use cortex::app::App;

/// Print what `search_memory` would return for `query`.
pub async fn recall(app: &App, user: &str, query: &str, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(app.config.memory.retrieval_limit);
    let facts = app.memory.retrieve_relevant(user, query, limit).await?;

    if facts.is_empty() {
        println!("No relevant memories found.");
        return Ok(());
    }

    println!("Found {} fact(s) for '{user}':\n", facts.len());
    for (i, fact) in facts.iter().enumerate() {
        println!("  {}. {}", i + 1, fact);
    }
    Ok(())
}
