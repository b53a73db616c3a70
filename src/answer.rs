//! Conversational answering layer.
//!
//! Two modes over the same retrieval path:
//!
//! - `ask`: retrieve, render the answer prompt, one completion, done.
//! - `chat`: a stdin read-eval loop that keeps (question, answer) history
//!   in memory for the session. Follow-up questions are first condensed
//!   into standalone questions so retrieval sees full context.
//!
//! Every answer is followed by the top retrieved source's metadata so the
//! user can tell which newsletter the answer came from.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingClient;
use crate::llm::{ChatClient, ChatMessage};
use crate::models::RetrievedChunk;
use crate::retrieve;

const ANSWER_TEMPLATE: &str = "\
Please use the following context to answer questions.
Context: {context}
---
Question: {question}
Answer: Let's think step by step.";

const CONDENSE_TEMPLATE: &str = "\
Given the following conversation and a follow up question, rephrase the \
follow up question to be a standalone question. Answer the question by \
thinking step by step.
Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

/// Render the answer prompt from retrieved context and the question.
pub fn build_answer_prompt(context: &str, question: &str) -> String {
    ANSWER_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Render the condense prompt from prior turns and the follow-up question.
pub fn build_condense_prompt(history: &[(String, String)], question: &str) -> String {
    CONDENSE_TEMPLATE
        .replace("{chat_history}", &format_history(history))
        .replace("{question}", question)
}

fn format_history(history: &[(String, String)]) -> String {
    history
        .iter()
        .map(|(q, a)| format!("Human: {}\nAssistant: {}", q, a))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_source(chunk: &RetrievedChunk) -> String {
    let title = chunk.title.as_deref().unwrap_or("(untitled)");
    format!(
        "{} [{} chunk {}]",
        title, chunk.source_id, chunk.chunk_index
    )
}

/// Answer one question against the index: retrieve top-k, prompt, complete.
/// Returns the answer and the retrieved chunks (best first).
pub async fn answer_question(
    pool: &sqlx::SqlitePool,
    embedder: &EmbeddingClient,
    llm: &ChatClient,
    config: &Config,
    question: &str,
) -> Result<(String, Vec<RetrievedChunk>)> {
    let matched = retrieve::retrieve(pool, embedder, question, config.retrieval.top_k).await?;

    let context = matched
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = build_answer_prompt(&context, question);
    let reply = llm.complete(&[ChatMessage::user(prompt)]).await?;

    Ok((reply, matched))
}

/// Rephrase a follow-up question into a standalone one using the chat
/// history. First turns pass through unchanged.
async fn condense_question(
    llm: &ChatClient,
    history: &[(String, String)],
    question: &str,
) -> Result<String> {
    if history.is_empty() {
        return Ok(question.to_string());
    }
    let prompt = build_condense_prompt(history, question);
    let standalone = llm.complete(&[ChatMessage::user(prompt)]).await?;
    Ok(standalone.trim().to_string())
}

/// CLI entry point for `lmill ask`.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let embedder = EmbeddingClient::from_config(&config.embedding)?;
    let llm = ChatClient::from_config(&config.llm)?;
    let pool = db::connect(config).await?;

    let (reply, matched) = answer_question(&pool, &embedder, &llm, config, question).await?;

    println!("{}", reply.trim());
    if let Some(top) = matched.first() {
        println!();
        println!("source: {}", format_source(top));
    }

    pool.close().await;
    Ok(())
}

/// CLI entry point for `lmill chat`: read-eval loop until `exit` or EOF.
pub async fn run_chat(config: &Config) -> Result<()> {
    let embedder = EmbeddingClient::from_config(&config.embedding)?;
    let llm = ChatClient::from_config(&config.llm)?;
    let pool = db::connect(config).await?;

    let mut history: Vec<(String, String)> = Vec::new();
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("Prompt: ");
        std::io::stdout().flush()?;

        let question = match lines.next() {
            Some(line) => line?,
            None => break, // EOF
        };
        let question = question.trim().to_string();
        if question.is_empty() {
            continue;
        }
        if question == "exit" {
            break;
        }

        // Network failures end the turn, not the session.
        let turn = async {
            let standalone = condense_question(&llm, &history, &question).await?;
            answer_question(&pool, &embedder, &llm, config, &standalone).await
        };

        match turn.await {
            Ok((reply, matched)) => {
                let reply = reply.trim().to_string();
                println!("{}", reply);
                if let Some(top) = matched.first() {
                    println!("source: {}", format_source(top));
                }
                println!();
                history.push((question, reply));
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_prompt_embeds_context_and_question() {
        let prompt = build_answer_prompt("some context", "what happened?");
        assert!(prompt.contains("Context: some context"));
        assert!(prompt.contains("Question: what happened?"));
        assert!(prompt.ends_with("Let's think step by step."));
    }

    #[test]
    fn condense_prompt_lists_turns_in_order() {
        let history = vec![
            ("first q".to_string(), "first a".to_string()),
            ("second q".to_string(), "second a".to_string()),
        ];
        let prompt = build_condense_prompt(&history, "and then?");
        let first = prompt.find("Human: first q").unwrap();
        let second = prompt.find("Human: second q").unwrap();
        assert!(first < second);
        assert!(prompt.contains("thinking step by step"));
        assert!(prompt.contains("Follow Up Input: and then?"));
        assert!(prompt.ends_with("Standalone question:"));
    }

    #[test]
    fn source_line_names_title_and_position() {
        let chunk = RetrievedChunk {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            chunk_index: 3,
            text: String::new(),
            score: 0.9,
            title: Some("Weekly Digest".to_string()),
            source_id: "Weekly Digest.html".to_string(),
            updated_at: 0,
        };
        assert_eq!(
            format_source(&chunk),
            "Weekly Digest [Weekly Digest.html chunk 3]"
        );
    }
}
