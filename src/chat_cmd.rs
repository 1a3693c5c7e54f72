//! Chat log commands: `weave chat ...`.

use anyhow::Result;

use ragweave_core::models::{ChatChunk, Metadata};

use crate::app::App;
use crate::config::Config;

pub async fn run_add(config: &Config, role: &str, content: &str, metadata: Option<&str>) -> Result<()> {
    let metadata = match metadata {
        Some(raw) => Some(serde_json::from_str::<Metadata>(raw)?),
        None => None,
    };

    let app = App::open(config).await?;
    let message = app.chat.create_message(role, content, metadata).await?;
    println!(
        "Added message {} (role: {}, index: {})",
        message.id,
        message.role.as_str(),
        message.chunk_index
    );
    Ok(())
}

pub async fn run_list(config: &Config, role: Option<&str>, limit: i64, offset: i64) -> Result<()> {
    let app = App::open(config).await?;
    let messages = match role {
        Some(role) => app.chat.messages_by_role(role, limit, offset).await?,
        None => app.chat.list_messages(limit, offset).await?,
    };

    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for message in &messages {
        print_message(message);
    }
    Ok(())
}

fn print_message(message: &ChatChunk) {
    println!(
        "[{}] #{} {} {}",
        message.ctime.format("%Y-%m-%d %H:%M:%S"),
        message.id,
        message.role.as_str(),
        message.content.replace('\n', " ")
    );
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let app = App::open(config).await?;
    app.chat.delete_message(id).await?;
    println!("Deleted message {}", id);
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, top_k: i64) -> Result<()> {
    let app = App::open(config).await?;
    let hits = app.chat.search_similar(query, top_k).await?;

    if hits.is_empty() {
        println!("No similar messages.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] #{} {}: {}",
            i + 1,
            hit.similarity,
            hit.chunk.id,
            hit.chunk.role.as_str(),
            hit.chunk.content.replace('\n', " ")
        );
    }
    Ok(())
}
