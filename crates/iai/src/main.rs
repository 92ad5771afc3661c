//! A terminal chat over the projects of a gateway, using `iai` as a library.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use iai::SessionBuilder;
use iai::core::conversation::{ConversationId, TurnResult, TurnStatus};
use iai::core::{CompactionPolicy, OrchestratorConfig, TurnError};
use iai_anthropic_model::{AnthropicConfigBuilder, AnthropicProvider};
use iai_sqlite_store::SqliteStore;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";
const DEFAULT_DATABASE: &str = "iai.db";
const DEFAULT_PROJECTS_DIR: &str = "projects";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(api_key) = env::var("ANTHROPIC_API_KEY") else {
        eprintln!("ANTHROPIC_API_KEY environment variable is not set");
        return;
    };
    let mut config = AnthropicConfigBuilder::with_api_key(api_key);
    if let Ok(model) = env::var("IAI_MODEL") {
        config = config.with_model(model);
    }
    let model_provider = AnthropicProvider::new(config.build());

    let database = env_or("IAI_DATABASE", DEFAULT_DATABASE);
    let store = match SqliteStore::open(&database) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("failed to open database {database}: {err}");
            return;
        }
    };

    let user_name = env::var("IAI_USER")
        .or_else(|_| env::var("USER"))
        .unwrap_or_else(|_| "user".to_owned());
    let mut orchestrator_config = OrchestratorConfig::default()
        .with_debug_logs(env_flag("IAI_DEBUG_LOGS", true));
    if !env_flag("IAI_AUTO_COMPACTION", true) {
        orchestrator_config = orchestrator_config
            .with_compaction_policy(CompactionPolicy::disabled());
    }
    let mut builder = SessionBuilder::new(model_provider, store)
        .with_config(orchestrator_config)
        .with_projects_dir(env_or("IAI_PROJECTS_DIR", DEFAULT_PROJECTS_DIR))
        .with_user(user_name)
        .with_project(env_or("IAI_PROJECT", ""));
    if let Ok(id) = env::var("IAI_CONVERSATION") {
        builder = builder.with_conversation(ConversationId::from(id));
    }
    let session = match builder.build().await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("failed to start the session: {err}");
            return;
        }
    };
    println!(
        "{}",
        format!("conversation {}", session.conversation_id()).dimmed()
    );

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let mut lines = io::BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("error reading input: {}", err);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");

        let turn = session.send_message(line);
        tokio::pin!(turn);
        let result = loop {
            progress_bar.inc(1);
            select! {
                result = &mut turn => break result,
                _ = sleep(Duration::from_millis(100)) => {}
            }
        };

        // Finish the progress bar before printing anything else.
        progress_bar.finish_and_clear();
        match result {
            Ok(result) => print_result(&result),
            Err(err) => print_error(&err),
        }
    }
}

fn print_result(result: &TurnResult) {
    for invocation in &result.tool_invocations {
        let bar = if invocation.is_error {
            BAR_CHAR.bright_red().to_string()
        } else {
            BAR_CHAR.bright_black().to_string()
        };
        println!(
            "{bar}🔧 {} {}",
            invocation.name.bright_white(),
            invocation.input.dimmed()
        );
    }
    println!("{}🤖 {}", BAR_CHAR.bright_cyan(), result.text.bright_white());
    if result.status == TurnStatus::TruncatedByIterationLimit {
        println!(
            "{}⚠️  Stopped after {} tool rounds.",
            BAR_CHAR.bright_yellow(),
            result.iterations
        );
    }
    println!(
        "{}",
        format!(
            "tokens: {} in, {} out",
            result.usage.input_tokens, result.usage.output_tokens
        )
        .dimmed()
    );
    println!();
}

fn print_error(err: &TurnError) {
    println!("{}❌ {}", BAR_CHAR.bright_red(), err.to_string().bright_red());
    println!();
}

#[inline]
fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Reads a boolean switch that `0`, `false`, `no` or `off` turns off.
fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        Err(_) => default,
    }
}
