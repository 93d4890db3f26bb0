use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use docintel_core::config::Config;
use docintel_core::context::{load_classifier, load_rag};
use docintel_core::provider::loader;
use docintel_core::rag::{build_corpus, load_knowledge_base, Embedder, IndexedCorpus};
use docintel_core::server::{Client, Request, Response};
use docintel_core::{AnswerRequest, AppContext, ClassifyRequest, Server};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docintel")]
#[command(about = "Topic classification and knowledge-base question answering", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show {
        #[arg(long, help = "Print the effective configuration as YAML")]
        yaml: bool,
    },

    #[command(about = "Serve classification and question answering on the Unix socket")]
    Serve,

    #[command(about = "Classify a text into a topic class")]
    Classify {
        text: String,

        #[arg(long, help = "Send the request to a running server instead of loading the model")]
        remote: bool,
    },

    #[command(about = "Answer a question from the knowledge base")]
    Ask {
        question: String,

        #[arg(short = 'k', long, help = "Number of passages to retrieve (default: rag.top_k)")]
        top_k: Option<usize>,

        #[arg(long, help = "Send the request to a running server instead of loading the models")]
        remote: bool,
    },

    #[command(about = "Show the status of a running server")]
    Status,

    #[command(about = "Similarity index commands")]
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    #[command(about = "Embed the knowledge base and write the index snapshot")]
    Build {
        #[arg(short, long, help = "Snapshot path (default: assets.index_path)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Show knowledge base and index statistics")]
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config);

    match cli.command {
        Commands::Show { yaml: true } => {
            print!("{}", serde_yaml::to_string(&config).context("Failed to serialize config")?);
            Ok(())
        }
        Commands::Show { yaml: false } => show_config(&config),
        Commands::Serve => serve(config).await,
        Commands::Classify { text, remote } => classify(&config, text, remote).await,
        Commands::Ask {
            question,
            top_k,
            remote,
        } => ask(&config, question, top_k, remote).await,
        Commands::Status => status(&config).await,
        Commands::Index { command } => match command {
            IndexCommands::Build { output } => build_index(&config, output).await,
            IndexCommands::Stats => index_stats(&config),
        },
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "Server:".bold());
    println!("  Socket:          {}", config.server.socket_path);
    println!();
    println!("{}", "Assets:".bold());
    println!("  Knowledge Base:  {}", config.assets.knowledge_base_path.display());
    println!("  Index:           {}", config.assets.index_path.display());
    println!("  Build If Missing: {}", config.assets.build_index_if_missing);
    println!();
    println!("{}", "Embedding:".bold());
    println!("  Backend:         {:?}", config.embedding.backend);
    println!("  Model:           {}", config.embedding.model.cyan());
    println!("  Base URL:        {}", config.embedding.base_url);
    println!("  Model Dir:       {}", config.embedding.model_dir.display());
    println!();
    println!("{}", "Generator:".bold());
    println!("  Model Dir:       {}", config.generator.model_dir.display());
    println!("  EOS Token:       {}", config.generator.eos_token);
    println!("  Context Tokens:  {}", config.generator.max_context_tokens);
    println!();
    println!("{}", "Classifier:".bold());
    println!("  Model Dir:       {}", config.classifier.model_dir.display());
    println!("  Classes:         {}", config.classifier.class_names.join(", ").cyan());
    println!();
    println!("{}", "RAG:".bold());
    println!("  Top K:           {}", config.rag.top_k);
    println!("  Max New Tokens:  {}", config.rag.max_new_tokens);
    println!("  No-Repeat N-gram: {}", config.rag.no_repeat_ngram_size);
    println!("  Metric:          {:?}", config.rag.metric);
    println!();
    println!("{}", "Logging:".bold());
    println!("  Filter:          {}", config.logging.filter);
    match &config.logging.request_log_path {
        Some(path) => println!("  Request Log:     {}", path.display()),
        None => println!("  Request Log:     {}", "disabled".yellow()),
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!("Loading models");
    let context = Arc::new(AppContext::load(&config).await);
    for capability in context.status().capabilities {
        if capability.available {
            println!("{} {} ready", "✓".green().bold(), capability.name);
        } else {
            println!(
                "{} {} unavailable: {}",
                "✗".red().bold(),
                capability.name,
                capability.reason.unwrap_or_default()
            );
        }
    }

    let server = Server::new(&config.server.socket_path, context);
    println!("{} Listening on {}", "→".blue(), config.server.socket_path.bold());
    server.start().await.context("Server failed")?;
    Ok(())
}

async fn send(config: &Config, request: Request) -> Result<Response> {
    let mut client = Client::connect(&config.server.socket_path)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {}. Is `docintel serve` running?",
                config.server.socket_path
            )
        })?;
    Ok(client.send(&request).await?)
}

fn remote_error(kind: &str, message: &str) -> Result<()> {
    anyhow::bail!("{} ({})", message, kind)
}

async fn classify(config: &Config, text: String, remote: bool) -> Result<()> {
    let request = ClassifyRequest { text };

    let result = if remote {
        match send(config, Request::Classify(request)).await? {
            Response::Classification(result) => result,
            Response::Error(e) => return remote_error(&e.kind, &e.message),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    } else {
        let classifier = load_classifier(config).await?;
        classifier.classify(&request.text).await?
    };

    println!(
        "{} {} (confidence {:.4})",
        "Class:".bold(),
        result.predicted_class.cyan().bold(),
        result.confidence
    );
    Ok(())
}

async fn ask(config: &Config, question: String, top_k: Option<usize>, remote: bool) -> Result<()> {
    if remote {
        let request = Request::Answer(AnswerRequest { question });
        return match send(config, request).await? {
            Response::Answer(response) => {
                println!("{} {}", "Answer:".bold().green(), response.answer);
                Ok(())
            }
            Response::Error(e) => remote_error(&e.kind, &e.message),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        };
    }

    let engine = load_rag(config).await?;
    let k = top_k.unwrap_or(config.rag.top_k);
    let answer = engine.ask(&question, k).await?;

    println!("{}", "Retrieved passages:".bold());
    for (rank, hit) in answer.passages.iter().enumerate() {
        let marker = if rank < answer.passages_used {
            "•".cyan()
        } else {
            "-".dimmed()
        };
        println!(
            "  {} [{}] ({:.4}) {}",
            marker, hit.passage.id, hit.distance, hit.passage.text
        );
    }
    println!();
    println!("{} {}", "Answer:".bold().green(), answer.answer);
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    match send(config, Request::Status).await? {
        Response::Status(status) => {
            println!("{}", status.message.bold());
            for capability in status.capabilities {
                let state = if capability.available {
                    "available".green()
                } else {
                    "unavailable".red()
                };
                print!("  {} {}", capability.name.bold(), state);
                match capability.reason {
                    Some(reason) => println!(": {}", reason),
                    None => println!(),
                }
            }
            Ok(())
        }
        Response::Error(e) => remote_error(&e.kind, &e.message),
        other => anyhow::bail!("Unexpected response: {:?}", other),
    }
}

async fn build_index(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.assets.index_path.clone());

    let texts = load_knowledge_base(&config.assets.knowledge_base_path).with_context(|| {
        format!(
            "Failed to load knowledge base {}",
            config.assets.knowledge_base_path.display()
        )
    })?;
    println!(
        "{} Embedding {} passages from {}...",
        "→".blue(),
        texts.len(),
        config.assets.knowledge_base_path.display()
    );

    let provider = loader::embedding_provider(&config.embedding)
        .context("Failed to create embedding provider")?;
    let corpus = build_corpus(&Embedder::new(provider), texts, config.rag.metric)
        .await
        .context("Failed to build index")?;

    corpus
        .index()
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} Indexed {} passages ({} dimensions) into {}",
        "✓".green().bold(),
        corpus.len(),
        corpus.index().dimension(),
        output.display().to_string().cyan()
    );
    Ok(())
}

fn index_stats(config: &Config) -> Result<()> {
    let corpus = IndexedCorpus::load(&config.assets.knowledge_base_path, &config.assets.index_path)
        .context("Failed to load knowledge base and index")?;

    println!("{}", "Index Statistics:".bold().green());
    println!("  Passages:   {}", corpus.len());
    println!("  Dimension:  {}", corpus.index().dimension());
    println!("  Metric:     {:?}", corpus.index().metric());

    let total_chars: usize = corpus.passages().iter().map(|p| p.text.chars().count()).sum();
    if !corpus.is_empty() {
        println!("  Avg Length: {} chars", total_chars / corpus.len());
    }
    Ok(())
}
