use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use pdf_autofill::processing::flatten::flatten;
use pdf_autofill::{ApplicantData, FieldNameMapping, FillerConfig, FormFiller};

#[derive(Parser, Debug)]
#[command(
    name = "pdf-autofill",
    about = "Fill insurance enrolment PDF forms from applicant JSON",
    version
)]
struct Cli {
    /// Config file (defaults to <config dir>/pdf-autofill/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Skip the model and use the keyword matcher only
    #[arg(long, global = true)]
    no_ai: bool,
    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill a template with applicant data
    Fill(FillArgs),
    /// List a template's fields with clean names and sections
    Analyze(AnalyzeArgs),
    /// Print the flattened key/value view of applicant data
    Flatten(FlattenArgs),
}

#[derive(Args, Debug)]
struct FillArgs {
    /// Template PDF
    #[arg(long)]
    template: PathBuf,
    /// Applicant data JSON
    #[arg(long)]
    data: PathBuf,
    /// Reviewed field-name mapping JSON (original name -> data key); skips the model
    #[arg(long)]
    mapping: Option<PathBuf>,
    /// Where to write the filled PDF
    #[arg(long)]
    out: PathBuf,
    /// Also write the base64 transport encoding here
    #[arg(long)]
    base64_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[arg(long)]
    template: PathBuf,
    /// Write the report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FlattenArgs {
    #[arg(long)]
    data: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = FillerConfig::load(cli.config.as_deref()).map_err(|e| anyhow!(e))?;
    if cli.no_ai {
        config.llm.enabled = false;
    }

    match cli.command {
        Command::Fill(args) => fill(config, args).await,
        Command::Analyze(args) => analyze(config, args).await,
        Command::Flatten(args) => {
            let data = read_applicant(&args.data)?;
            println!("{}", serde_json::to_string_pretty(&flatten(&data))?);
            Ok(())
        }
    }
}

async fn fill(config: FillerConfig, args: FillArgs) -> Result<()> {
    let template = std::fs::read(&args.template)
        .with_context(|| format!("Failed to read template {:?}", args.template))?;
    let data = read_applicant(&args.data)?;
    let mapping: Option<FieldNameMapping> = match &args.mapping {
        Some(path) => Some(read_json(path)?),
        None => None,
    };

    let filler = FormFiller::from_config(config)?;
    let outcome = filler.fill(&template, &data, mapping.as_ref()).await?;

    std::fs::write(&args.out, &outcome.pdf)
        .with_context(|| format!("Failed to write {:?}", args.out))?;
    if let Some(path) = &args.base64_out {
        std::fs::write(path, &outcome.encoded)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }

    tracing::info!(
        request_id = %outcome.request_id,
        filled = outcome.filled,
        "Wrote {:?}",
        args.out
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn analyze(config: FillerConfig, args: AnalyzeArgs) -> Result<()> {
    let template = std::fs::read(&args.template)
        .with_context(|| format!("Failed to read template {:?}", args.template))?;
    let filler = FormFiller::from_config(config)?;
    let report = serde_json::to_string_pretty(&filler.analyze(&template).await)?;

    match &args.out {
        Some(path) => std::fs::write(path, report)
            .with_context(|| format!("Failed to write {:?}", path))?,
        None => println!("{}", report),
    }
    Ok(())
}

fn read_applicant(path: &Path) -> Result<ApplicantData> {
    let value: serde_json::Value = read_json(path)?;
    ApplicantData::from_value(value)
        .ok_or_else(|| anyhow!("{:?} must contain a JSON object", path))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {:?}", path))
}
