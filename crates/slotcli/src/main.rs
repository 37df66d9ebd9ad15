// crates/slotcli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Map;
use slotcore::{SectionEvent, Topic};
use slotruntime::{EngineRuntime, RuntimeConfig, SectionStore, TopicStore, WidgetRegistry};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "slot")]
#[command(about = "Widget Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one widget action against a throwaway topic
    Run {
        /// Widget identifier
        #[arg(short, long)]
        widget: String,

        /// Action identifier
        #[arg(short, long, default_value = "generate")]
        action: String,

        /// Topic title used for the default context
        #[arg(short, long, default_value = "Demo Topic")]
        title: String,

        /// Free-text instructions appended to the prompt
        #[arg(short, long)]
        instructions: Option<String>,

        /// Request metadata as a JSON object string
        #[arg(short, long)]
        metadata: Option<String>,

        /// Model name override
        #[arg(long)]
        model: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List registered widgets and their actions
    Widgets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            widget,
            action,
            title,
            instructions,
            metadata,
            model,
            verbose,
        } => {
            // Initialize logging
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            run_execution(widget, action, title, instructions, metadata, model).await?;
        }

        Commands::Widgets => {
            list_widgets();
        }
    }

    Ok(())
}

async fn run_execution(
    widget: String,
    action: String,
    title: String,
    instructions: Option<String>,
    metadata: Option<String>,
    model: Option<String>,
) -> Result<()> {
    println!("🚀 Widget Engine demo run");

    // Parse request metadata
    let mut metadata: Map<String, serde_json::Value> = match metadata {
        Some(raw) => {
            let json: serde_json::Value = serde_json::from_str(&raw)?;
            match json {
                serde_json::Value::Object(map) => map,
                _ => return Err(anyhow::anyhow!("Metadata must be a JSON object")),
            }
        }
        None => Map::new(),
    };
    if let Some(model) = model {
        metadata.insert("model".to_string(), serde_json::Value::String(model));
    }

    // Build the runtime with the built-in widget catalog
    let mut registry = WidgetRegistry::new();
    slotwidgets::register_all(&mut registry);

    let runtime = EngineRuntime::with_registry(registry, RuntimeConfig::from_env())?;

    // Seed a throwaway topic to execute against
    let topic = Topic::new(Uuid::new_v4(), title);
    runtime.topics().insert(topic.clone()).await;

    println!("📋 Topic: {} ({})", topic.title, topic.id);
    println!();

    // Subscribe to events for real-time output
    let mut printer_events = runtime.subscribe_events();
    let mut wait_events = runtime.subscribe_events();

    let printer = tokio::spawn(async move {
        while let Ok(event) = printer_events.recv().await {
            match event {
                SectionEvent::ExecutionQueued {
                    section_id,
                    widget,
                    action,
                    ..
                } => {
                    println!("📨 Queued section {} ({} / {})", section_id, widget, action);
                }
                SectionEvent::ExecutionStarted { attempt, .. } => {
                    println!("  ⚡ Attempt {} started", attempt);
                }
                SectionEvent::ExecutionFinished { attempt, .. } => {
                    println!("  ✅ Attempt {} finished", attempt);
                }
                SectionEvent::ExecutionFailed {
                    attempt,
                    error_code,
                    will_retry,
                    ..
                } => {
                    if will_retry {
                        println!("  ❌ Attempt {} failed ({}), retrying", attempt, error_code);
                    } else {
                        println!("  ❌ Attempt {} failed ({})", attempt, error_code);
                    }
                }
            }
        }
    });

    // Enqueue and follow the run to its terminal state
    let handle = runtime
        .dispatcher()
        .enqueue(&topic, &widget, &action, None, metadata, instructions)
        .await?;

    while let Ok(event) = wait_events.recv().await {
        if event.section_id() == handle.section_id && event.is_terminal() {
            break;
        }
    }

    // Give the printer a moment to flush
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();

    let section = runtime.sections().get(handle.section_id).await?;

    println!();
    println!("📊 Final section state:");
    println!("   Section: {}", section.id);
    println!("   Status: {}", section.status().as_str());
    println!("   Attempts logged: {}", section.execution_logs.len());
    if let Some(error) = &section.execution_state.error_message {
        println!("   Error: {}", error);
    }

    println!();
    println!("📤 Content:");
    println!("{}", serde_json::to_string_pretty(&section.content)?);

    runtime.shutdown().await;

    Ok(())
}

fn list_widgets() {
    println!("📦 Registered Widgets:");
    println!();

    let mut registry = WidgetRegistry::new();
    slotwidgets::register_all(&mut registry);

    for info in registry.list_widgets() {
        match &info.icon {
            Some(icon) => println!("  • {} ({})", info.name, icon),
            None => println!("  • {}", info.name),
        }
        println!("    actions: {}", info.actions.join(", "));
        if !info.default_tools.is_empty() {
            println!("    tools: {}", info.default_tools.join(", "));
        }
    }
}
