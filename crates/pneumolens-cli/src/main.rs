mod display;
mod embed;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pneumolens_ai::{
    AnswerStrategy, CnnSpec, HttpGenerator, ModelState, ResponderState, default_loaders,
    load_model,
};
use pneumolens_auth::{AuthConfig, AuthService};
use pneumolens_core::REFERENCE_CORPUS;
use pneumolens_server::{AppState, ServerConfig};
use tracing::info;

use crate::embed::{EmbedderKind, load_embedder};

#[derive(Parser)]
#[command(name = "pneumolens", about = "Chest X-ray pneumonia classifier and retrieval responder", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve(ServeArgs),
    /// Classify a single image file.
    Predict(PredictArgs),
    /// Answer a question from the reference corpus.
    Ask(AskArgs),
}

#[derive(Args)]
struct ModelArgs {
    /// Classifier parameter file (safetensors, or a full ONNX graph).
    #[arg(long, env = "PNEUMOLENS_MODEL", default_value = "models/pneumonia_cnn.safetensors")]
    model: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnswerMode {
    Concatenate,
    Generate,
}

#[derive(Args)]
struct RagArgs {
    /// Directory holding the sentence embedder's `model.onnx` and `tokenizer.json`.
    #[arg(long, env = "PNEUMOLENS_EMBED_MODEL_DIR", default_value = "models/all-MiniLM-L6-v2")]
    embed_model_dir: PathBuf,

    #[arg(long, env = "PNEUMOLENS_EMBEDDER", value_enum, default_value_t = EmbedderKind::Auto)]
    embedder: EmbedderKind,

    #[arg(long, env = "PNEUMOLENS_ANSWER_MODE", value_enum, default_value_t = AnswerMode::Concatenate)]
    answer_mode: AnswerMode,

    /// Base URL of an Ollama-compatible completion server.
    #[arg(long, env = "PNEUMOLENS_GENERATOR_URL", default_value = "http://localhost:11434")]
    generator_url: String,

    #[arg(long, env = "PNEUMOLENS_GENERATOR_MODEL", default_value = "llama3.2")]
    generator_model: String,

    #[arg(long, env = "PNEUMOLENS_GENERATOR_MAX_TOKENS", default_value_t = 256)]
    generator_max_tokens: u32,

    /// Passages joined into the answer context.
    #[arg(long, env = "PNEUMOLENS_TOP_K", default_value_t = pneumolens_ai::DEFAULT_TOP_K)]
    top_k: usize,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "PNEUMOLENS_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Require a bearer access token on /api/predict/.
    #[arg(long, env = "PNEUMOLENS_REQUIRE_AUTH")]
    require_auth: bool,

    #[arg(long, env = "PNEUMOLENS_ACCESS_TTL_SECS", default_value_t = 300)]
    access_ttl_secs: i64,

    #[arg(long, env = "PNEUMOLENS_REFRESH_TTL_SECS", default_value_t = 86_400)]
    refresh_ttl_secs: i64,

    #[arg(long, env = "PNEUMOLENS_PBKDF2_ITERATIONS", default_value_t = pneumolens_auth::password::DEFAULT_ITERATIONS)]
    pbkdf2_iterations: u32,

    /// Maximum request body size in bytes.
    #[arg(long, env = "PNEUMOLENS_UPLOAD_LIMIT", default_value_t = pneumolens_server::config::DEFAULT_UPLOAD_LIMIT)]
    upload_limit: usize,

    /// Allowed CORS origin; repeat or comma-separate. Omit for permissive CORS.
    #[arg(long = "cors-origin", env = "PNEUMOLENS_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    rag: RagArgs,
}

#[derive(Args)]
struct PredictArgs {
    /// Image file (PNG or JPEG).
    image: PathBuf,

    /// Print the JSON body the API would return.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct AskArgs {
    query: String,

    #[command(flatten)]
    rag: RagArgs,
}

fn load_classifier(path: &Path) -> ModelState {
    load_model(path, &CnnSpec::default(), &default_loaders())
}

fn build_responder(args: &RagArgs) -> ResponderState {
    let strategy = match args.answer_mode {
        AnswerMode::Concatenate => AnswerStrategy::Concatenate,
        AnswerMode::Generate => AnswerStrategy::Generate(Arc::new(HttpGenerator::new(
            args.generator_url.clone(),
            args.generator_model.clone(),
            args.generator_max_tokens,
        ))),
    };
    let embedder = load_embedder(args.embedder, &args.embed_model_dir, REFERENCE_CORPUS);
    ResponderState::build(embedder, REFERENCE_CORPUS, strategy, args.top_k)
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.access_ttl_secs > 0 && args.refresh_ttl_secs > 0,
        "token TTLs must be positive"
    );
    let auth = AuthConfig {
        access_ttl: chrono::Duration::seconds(args.access_ttl_secs),
        refresh_ttl: chrono::Duration::seconds(args.refresh_ttl_secs),
        pbkdf2_iterations: args.pbkdf2_iterations,
    };
    let config = ServerConfig {
        bind: args.bind,
        require_auth: args.require_auth,
        upload_limit: args.upload_limit,
        cors_origins: args.cors_origins,
    };

    let model_path = args.model.model;
    let rag = args.rag;
    let (model, responder) =
        tokio::task::spawn_blocking(move || (load_classifier(&model_path), build_responder(&rag)))
            .await
            .context("startup loading panicked")?;
    info!(
        model_loaded = model.is_ready(),
        responder_ready = responder.is_ready(),
        "startup complete"
    );

    let state = AppState {
        model,
        responder,
        auth: Arc::new(AuthService::new(&auth)),
        require_auth: config.require_auth,
    };
    pneumolens_server::serve(state, &config).await
}

fn predict(args: PredictArgs) -> anyhow::Result<()> {
    let predictor = match load_classifier(&args.model.model) {
        ModelState::Ready(p) => p,
        ModelState::Unavailable { reason } => anyhow::bail!("Model not loaded: {reason}"),
    };
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;
    let prediction = predictor.predict_image(&bytes)?;

    if args.json {
        println!("{}", serde_json::to_string(&prediction)?);
    } else {
        print!(
            "{}",
            display::prediction_card(&args.image, &prediction, predictor.backend())
        );
    }
    Ok(())
}

async fn ask(args: AskArgs) -> anyhow::Result<()> {
    let responder = match build_responder(&args.rag) {
        ResponderState::Ready(r) => r,
        ResponderState::Unavailable { reason } => {
            anyhow::bail!("responder not available: {reason}")
        }
    };
    let answer = responder.generate_answer(&args.query).await?;
    print!("{}", display::answer_text(&answer));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
    info!("pneumolens v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Predict(args) => predict(args)?,
        Commands::Ask(args) => ask(args).await?,
    }
    Ok(())
}
