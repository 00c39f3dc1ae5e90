//! Command-line front end.

use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::StudioConfig;
use crate::content;
use crate::error::{GenError, Result};
use crate::provider::ImageBackend;
use crate::studio::{Studio, StudioOptions};
use crate::types::{Backend, GenerationRequest, GenerationResult};

/// genstudio CLI
#[derive(Parser, Debug)]
#[command(name = "genstudio", version, about = "Generate articles, images and videos from a prompt")]
pub struct Cli {
    /// Load credentials from this env file instead of ./.env
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a grounded blog post
    Article(ArticleArgs),
    /// Generate an image
    Image(ImageArgs),
    /// Generate a short video clip
    Video(VideoArgs),
    /// Convert article text between HTML and plain text (stdin to stdout)
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
pub struct ArticleArgs {
    /// Topic of the article
    pub prompt: String,

    /// Print plain text instead of HTML
    #[arg(long)]
    pub text: bool,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Description of the image
    pub prompt: String,

    /// Service that renders the image (flux, hugging-face, gemini)
    #[arg(short, long, default_value = "flux")]
    pub backend: ImageBackend,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Write inline image data to this file instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VideoArgs {
    /// Description of the clip
    pub prompt: String,

    /// Also send guidance scale and frame size
    #[arg(long)]
    pub advanced: bool,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub num_frames: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertTarget {
    Text,
    Html,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[arg(long, value_enum)]
    pub to: ConvertTarget,
}

/// Run a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert(args) => handle_convert(args),
        command => {
            let config = match &cli.env_file {
                Some(path) => StudioConfig::from_env_file(path)?,
                None => StudioConfig::from_env(),
            };
            handle_generate(command, &config).await
        }
    }
}

async fn handle_generate(command: Commands, config: &StudioConfig) -> Result<()> {
    let (request, image_backend, output, plain_text) = match command {
        Commands::Article(args) => (
            GenerationRequest::article(args.prompt),
            ImageBackend::default(),
            None,
            args.text,
        ),
        Commands::Image(args) => {
            let mut request = GenerationRequest::image(args.prompt);
            if let Some(seed) = args.seed {
                request = request.with_parameter("seed", seed);
            }
            (request, args.backend, args.output, false)
        }
        Commands::Video(args) => {
            let mut request =
                GenerationRequest::video(args.prompt).with_parameter("advanced", args.advanced);
            if let Some(seed) = args.seed {
                request = request.with_parameter("seed", seed);
            }
            if let Some(frames) = args.num_frames {
                request = request.with_parameter("num_frames", frames);
            }
            (request, ImageBackend::default(), None, false)
        }
        Commands::Convert(args) => return handle_convert(args),
    };

    let options = StudioOptions {
        backends: vec![request.backend()],
        image_backend,
        ..Default::default()
    };
    let studio = Studio::from_config(config, options)?;
    let result = studio.submit(&request).await?;

    print_result(&result, output.as_deref(), plain_text)
}

fn print_result(result: &GenerationResult, output: Option<&Path>, plain_text: bool) -> Result<()> {
    match result {
        GenerationResult::Article { html, sources } => {
            if plain_text {
                println!("{}", content::to_plain_text(html));
            } else {
                println!("{html}");
            }
            if !sources.is_empty() {
                eprintln!("\nSources:");
                for source in sources {
                    eprintln!("  {} <{}>", source.title, source.uri);
                }
            }
        }
        GenerationResult::Image { url } | GenerationResult::Video { url } => match output {
            Some(path) if result.backend() == Backend::Image => {
                std::fs::write(path, decode_data_uri(url)?)?;
                eprintln!("Wrote {}", path.display());
            }
            _ => println!("{url}"),
        },
    }
    Ok(())
}

/// Decode a base64 `data:` URI into raw bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let payload = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .ok_or_else(|| {
            GenError::InvalidArgument(
                "--output needs inline image data; this backend returned a URL".to_string(),
            )
        })?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| GenError::malformed(format!("invalid base64 image data: {e}")))
}

fn handle_convert(args: ConvertArgs) -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let output = match args.to {
        ConvertTarget::Text => content::to_plain_text(&input),
        ConvertTarget::Html => content::to_html(&input),
    };
    println!("{output}");
    Ok(())
}
