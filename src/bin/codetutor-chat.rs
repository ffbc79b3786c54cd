//! Interactive programming tutor.
//!
//! This binary provides a streaming REPL over the Groq chat-completion API.  Answers are in
//! French and may be grounded with passages retrieved from a Pinecone index.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; GROQ_API_KEY comes from the environment or ./.env
//! codetutor-chat
//!
//! # Start on a given model
//! codetutor-chat --model llama3-8b-8192
//!
//! # Ground answers with retrieved context
//! codetutor-chat --rag --index course-notes --top-k 5
//! ```
//!
//! # Commands
//!
//! - `/models` - List the available models
//! - `/model <name>` - Switch model
//! - `/history` - Show the conversation so far
//! - `/new` - Start a new conversation
//! - `/rag on|off` - Toggle context retrieval
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::{EnvFilter, fmt};

use codetutor::chat::{
    ChatArgs, ChatCommand, ChatConfig, Orchestrator, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use codetutor::{
    ChatSession, ContextRetriever, Groq, HuggingFaceEmbedder, PineconeIndex, SessionId,
    SessionStore,
};

/// Environment variable holding the log filter.
const LOG_FILTER_VAR: &str = "CODETUTOR_LOG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("codetutor-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Variables already set in the environment win over the file.
    if let Err(err) = dotenvy::from_path(&config.env_file) {
        if !err.not_found() {
            tracing::warn!(
                path = %config.env_file,
                error = %err,
                "could not load environment file"
            );
        }
    }

    let selector = config.selector()?;
    let client = Groq::new(None)?;
    let mut orchestrator = Orchestrator::new(Arc::new(client), selector);
    if config.retrieval_enabled {
        let retriever = connect_retriever(&config.index_name).await?;
        orchestrator = orchestrator.with_retriever(retriever, config.top_k);
        orchestrator.set_retrieval_enabled(true);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut renderer =
        PlainTextRenderer::with_color(config.use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    let mut store = SessionStore::with_system_prompt(config.system_prompt.clone());
    let session_id = SessionId::new("local");
    store.get_or_create(&session_id);

    println!(
        "Code Tutor (model: {})",
        orchestrator.selector().select_current()
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("Vous: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Au revoir !");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Models => {
                            let current = orchestrator.selector().select_current().clone();
                            println!("    Models:");
                            for model in orchestrator.selector().list_models() {
                                let marker = if *model == current { "*" } else { " " };
                                println!("    {marker} {model}");
                            }
                        }
                        ChatCommand::Model(name) => {
                            match orchestrator.selector_mut().select(&name) {
                                Ok(model) => {
                                    renderer.print_info(&format!("Model changed to: {model}"))
                                }
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::History => {
                            let session = store.get_or_create(&session_id);
                            if session.history().next().is_none() {
                                renderer.print_info("No messages yet.");
                            } else {
                                session.render_history(&mut renderer);
                            }
                        }
                        ChatCommand::New => {
                            store.end(&session_id);
                            store.get_or_create(&session_id);
                            renderer.print_info("Started a new conversation.");
                        }
                        ChatCommand::Rag(enabled) => {
                            if orchestrator.set_retrieval_enabled(enabled) {
                                renderer.print_info("Context retrieval enabled.");
                            } else if enabled {
                                renderer.print_error(
                                    "Context retrieval is unavailable; restart with --rag.",
                                );
                            } else {
                                renderer.print_info("Context retrieval disabled.");
                            }
                        }
                        ChatCommand::Stats => {
                            print_stats(store.get_or_create(&session_id), &orchestrator);
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                let session = store.get_or_create(&session_id);
                if let Err(e) = orchestrator
                    .handle_input(session, line, &mut renderer)
                    .await
                {
                    renderer.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nAu revoir !");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    store.end(&session_id);
    Ok(())
}

async fn connect_retriever(index_name: &str) -> Result<ContextRetriever, codetutor::Error> {
    let index = PineconeIndex::connect(None, index_name).await?;
    let embedder = HuggingFaceEmbedder::new(None)?;
    Ok(ContextRetriever::new(Arc::new(embedder), Arc::new(index)))
}

fn print_stats(session: &ChatSession, orchestrator: &Orchestrator) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", orchestrator.selector().select_current());
    println!("      Messages: {}", stats.total_turns);
    println!("      Questions: {}", stats.user_turns);
    println!("      Answers: {}", stats.assistant_turns);
    println!(
        "      Context retrieval: {}",
        if orchestrator.retrieval_enabled() {
            "on"
        } else {
            "off"
        }
    );
}
