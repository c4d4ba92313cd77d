use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use opcode_wizard::client::{AnswerBook, WizardBuilder};
use opcode_wizard::protocol::stream_file;
use opcode_wizard::ScannerRegistry;

#[derive(Parser)]
#[command(name = "opcode-wizard")]
#[command(about = "Discover packet opcodes by matching captured traffic against scanner heuristics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the scanner catalog in step order
    List {
        /// Also print which scanners write and read each session cell
        #[arg(long)]
        deps: bool,
    },
    /// Feed a recorded capture through the wizard
    Replay {
        /// Line-delimited JSON capture file
        #[arg(long)]
        capture: PathBuf,
        /// JSON object mapping scanner names to prompt answers
        #[arg(long)]
        answers: Option<PathBuf>,
        /// Give up on a step after this many seconds (0 waits forever)
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
        /// Print discoveries as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("opcode_wizard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = ScannerRegistry::new()?;

    match cli.command {
        Commands::List { deps } => {
            list(&registry);
            if deps {
                print_dependencies(&registry);
            }
        }
        Commands::Replay { capture, answers, timeout_secs, json } => {
            let mut book = match answers {
                Some(path) => AnswerBook::from_json(&std::fs::read_to_string(path)?)?,
                None => AnswerBook::new(),
            };

            let mut builder = WizardBuilder::new(registry);
            builder = if timeout_secs == 0 {
                builder.no_timeout()
            } else {
                builder.timeout(Duration::from_secs(timeout_secs))
            };
            let mut wizard = builder.build();

            let (tx, mut rx) = mpsc::channel(256);
            let reader = tokio::spawn(stream_file(capture, tx));
            let found = wizard.run(&mut rx, &mut book).await?;
            drop(rx);
            let sent = reader.await??;
            eprintln!("Replayed {} packets, {} opcodes found", sent, found.len());

            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                for discovery in &found {
                    println!("{} = {:#06X}", discovery.name, discovery.opcode);
                    if let Some(note) = &discovery.annotation {
                        println!("    {}", note);
                    }
                }
            }
        }
    }

    Ok(())
}

fn list(registry: &ScannerRegistry) {
    for (i, scanner) in registry.as_list().iter().enumerate() {
        println!("{:>3}. {} [{}]", i + 1, scanner.name(), scanner.origin());
        if !scanner.is_follow_up() {
            println!("     {}", scanner.tutorial());
        }
        for prompt in scanner.prompts() {
            println!("     ? {}", prompt);
        }
    }
}

fn print_dependencies(registry: &ScannerRegistry) {
    println!("\nSession cells:");
    for dep in registry.dependencies() {
        println!(
            "  {} ({}): written by {} / read by {}",
            dep.cell.name,
            dep.cell.kind.as_str(),
            dep.writers.join(", "),
            if dep.readers.is_empty() { "-".to_string() } else { dep.readers.join(", ") },
        );
    }
}
