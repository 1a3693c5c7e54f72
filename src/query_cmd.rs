//! Question answering: `weave query "<text>"`.
//!
//! Runs the retrieval-augmented chain and prints the answer followed by
//! the ranked source chunks. `--json` prints the full [`Answer`] instead.

use anyhow::Result;

use ragweave_core::rag::Answer;

use crate::app::App;
use crate::config::Config;

/// Longest source excerpt printed per hit.
const EXCERPT_CHARS: usize = 160;

pub async fn run_query(config: &Config, query: &str, top_k: Option<i64>, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let answer = app.rag.answer_top(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer.trim());
    println!();

    if answer.sources.is_empty() {
        println!("(no sources above the similarity threshold)");
    } else {
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            let name = if source.doc_name.is_empty() {
                source.doc_id.as_str()
            } else {
                source.doc_name.as_str()
            };
            println!("{}. [{:.3}] {}", i + 1, source.similarity, name);
            println!("    {}", excerpt(&source.content));
        }
    }

    if answer.usage.total_tokens > 0 {
        println!();
        println!(
            "tokens: {} prompt + {} completion = {}",
            answer.usage.prompt_tokens, answer.usage.completion_tokens, answer.usage.total_tokens
        );
    }
}

fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        flat
    } else {
        let head: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{head}...")
    }
}
