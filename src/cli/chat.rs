//! CLI `chat` command: one-shot or interactive conversation with the agent.

use anyhow::Result;
use std::io::{BufRead, Write};

use cortex::agent::{Agent, ChatOutcome, ChatRequest};
use cortex::app::App;

pub async fn chat(
    app: &App,
    user: &str,
    conversation: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let agent = app.agent()?;
    let conversation_id = conversation.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    if let Some(message) = message {
        return turn(&agent, user, &conversation_id, message).await;
    }

    eprintln!("Conversation {conversation_id}. Empty line or Ctrl-D to quit.");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        if let Err(e) = turn(&agent, user, &conversation_id, line.trim().to_string()).await {
            eprintln!("error: {e:#}");
        }
    }
    Ok(())
}

async fn turn(agent: &Agent, user: &str, conversation_id: &str, message: String) -> Result<()> {
    let ChatOutcome {
        reply, extraction, ..
    } = agent
        .chat(ChatRequest {
            user_id: user.to_string(),
            conversation_id: conversation_id.to_string(),
            message,
        })
        .await?;

    println!("{reply}");

    // Let background extraction land before the next turn reads memory
    if let Some(handle) = extraction {
        match handle.await {
            Ok(Ok(facts)) if !facts.is_empty() => {
                eprintln!("(remembered {} fact(s))", facts.len());
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => eprintln!("warning: could not save memories: {e}"),
            Err(e) => eprintln!("warning: memory extraction task failed: {e}"),
        }
    }
    Ok(())
}
