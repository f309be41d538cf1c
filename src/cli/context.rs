use anyhow::Result;

use cortex::app::App;

/// Print the context block the agent would see for `user`.
pub async fn context(
    app: &App,
    user: &str,
    min_importance: Option<f64>,
    constraints: bool,
) -> Result<()> {
    let block = if constraints {
        app.memory.build_constraint_context(user).await?
    } else {
        let min = min_importance.unwrap_or(app.config.memory.context_min_importance);
        app.memory.build_context(user, min).await?
    };
    println!("{block}");
    Ok(())
}
