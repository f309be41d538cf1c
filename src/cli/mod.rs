pub mod chat;
pub mod context;
pub mod forget;
pub mod re_embed;
pub mod recall;

use anyhow::Result;
use cortex::memory::types::Category;

/// Parse a comma-separated category list such as `preference,personal`.
pub fn parse_categories(raw: &str) -> Result<Vec<Category>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.to_lowercase()
                .parse::<Category>()
                .map_err(|e| anyhow::anyhow!("{e}"))
        })
        .collect()
}
