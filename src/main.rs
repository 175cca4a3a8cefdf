use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use rws_agents::agents::AgentFactory;
use rws_agents::backend::start_backend_server;
use rws_agents::collaboration::{create_fixed_workflow_chat, create_sequential_group, run_group_chat, test_agent};
use rws_agents::config::{Config, ConfigManager, FileConfigManager, ENV_OVERRIDES};
use rws_agents::error::{Result, WorkshopError};
use rws_agents::llm::Role;
use rws_agents::plugins::RagPlugin;
use rws_agents::telemetry::{init_tracing, Instrumentation};

#[derive(Parser)]
#[command(name = "rws-agents")]
#[command(version)]
#[command(about = "Multi-agent assistant for infrastructure data and documents", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the infrastructure backend API
    Serve,

    /// Run a group chat over all agents
    Chat {
        /// Opening user message
        message: String,

        /// Comma separated agent names to follow instead of round-robin
        #[arg(long, value_delimiter = ',')]
        workflow: Option<Vec<String>>,

        /// Turn cap for the conversation
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Ask a single agent one question
    Ask {
        /// Agent name, e.g. KnowledgeAgent
        agent: String,
        message: String,
    },

    /// Query the document knowledge base
    Search {
        query: String,

        #[arg(long, default_value = "3")]
        top: usize,

        /// Use plain keyword search
        #[arg(long)]
        simple: bool,
    },

    /// Upload a text file to the knowledge base
    Upload {
        file: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "local")]
        source: String,

        #[arg(long = "type", default_value = "report")]
        document_type: String,
    },

    /// Write a default configuration file
    InitConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = FileConfigManager::new(cli.config.clone());

    if let Commands::InitConfig = cli.command {
        manager.save_config(&Config::default()).await?;
        println!("Wrote default configuration to {}", cli.config.display());
        println!("Environment variables override the file:");
        for name in ENV_OVERRIDES {
            println!("  {}", name);
        }
        return Ok(());
    }

    let config = manager.load_config().await?;
    init_tracing(&config.logging)?;

    match cli.command {
        Commands::Serve => start_backend_server(Arc::new(config)).await,
        Commands::Chat {
            message,
            workflow,
            max_iterations,
        } => {
            let instrumentation = Instrumentation::new();
            let factory = AgentFactory::from_config(&config, instrumentation.clone())?;
            let agents = factory.all();

            let chat = match workflow {
                Some(sequence) => create_fixed_workflow_chat(agents, sequence.as_slice(), max_iterations)?,
                None => create_sequential_group(
                    agents,
                    max_iterations.unwrap_or(config.collaboration.max_iterations),
                ),
            };
            let mut chat = chat.with_instrumentation(instrumentation.clone());

            let history = run_group_chat(&mut chat, &message).await;
            for entry in history.iter().filter(|m| m.role != Role::System) {
                let speaker = entry.name.clone().unwrap_or_else(|| entry.role.to_string());
                println!("## {}\n{}\n", speaker, entry.content);
            }

            let snapshot = instrumentation.snapshot().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Commands::Ask { agent, message } => {
            let factory = AgentFactory::from_config(&config, Instrumentation::new())?;
            let agent = factory.by_name(&agent)?;
            let response = test_agent(&agent, &message).await?;
            println!("{}", response.content);
            Ok(())
        }
        Commands::Search { query, top, simple } => {
            let plugin = RagPlugin::from_config(&config)?;
            println!("{}", plugin.search_knowledge_base(&query, top, !simple).await);
            Ok(())
        }
        Commands::Upload {
            file,
            title,
            source,
            document_type,
        } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| WorkshopError::Config(format!("Failed to read {}: {}", file.display(), e)))?;
            let plugin = RagPlugin::from_config(&config)?;
            println!("{}", plugin.upload_document(&content, &title, &source, &document_type).await);
            Ok(())
        }
        Commands::InitConfig => Ok(()),
    }
}
