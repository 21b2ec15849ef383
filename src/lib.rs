pub mod cli;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod session;

use cli::Args;
use history::initialize_conversation_store;
use llm::{ new_client, LlmConfig };
use log::{ info, warn };
use session::ChatSession;
use std::error::Error;
use std::io::Write;
use tokio::io::AsyncBufReadExt;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Assistant Configuration ---");
    info!("Chat Endpoint: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Temperature: {}", args.chat_temperature);
    info!("History Window: {}", args.history_limit);
    info!("-------------------------------");

    let config = LlmConfig {
        base_url: args.chat_base_url.clone(),
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        model: args.chat_model.clone(),
        temperature: args.chat_temperature,
    };
    let transport = new_client(&config)?;
    let store = initialize_conversation_store();
    let mut session = ChatSession::new(transport, store, args.history_limit);

    println!("Type a message and press enter. /reset clears the conversation, /quit exits.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match text {
            "/quit" | "/exit" => {
                break;
            }
            "/reset" => {
                session.reset().await;
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        print!("assistant> ");
        std::io::stdout().flush()?;

        let mut printed = 0usize;
        let outcome = session.send_turn(text, |snapshot| {
            // Snapshots only ever grow; print the unseen tail.
            print!("{}", &snapshot[printed..]);
            printed = snapshot.len();
            let _ = std::io::stdout().flush();
        }).await;

        println!();
        if let Err(e) = outcome {
            warn!("turn failed: {}", e);
            println!("[notice] {}", e);
        }
    }

    Ok(())
}
