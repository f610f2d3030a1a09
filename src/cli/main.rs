use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "arp-cli")]
#[command(about = "Asset Risk Predictor CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "ARP_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a labelled CSV
    Train {
        #[arg(value_name = "CSV_FILE")]
        file: PathBuf,
    },

    /// Score the latest reading per asset with a trained model
    Predict {
        #[arg(short, long)]
        model_id: String,

        #[arg(value_name = "CSV_FILE")]
        file: PathBuf,
    },

    /// List known assets with their latest risk
    Assets,

    /// Show history and last readings for one asset
    Asset {
        #[arg(value_name = "ASSET_ID")]
        id: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List trained models, or show one
    Models {
        #[arg(value_name = "MODEL_ID")]
        id: Option<String>,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api/v1", cli.endpoint.trim_end_matches('/'));

    let response = match cli.command {
        Commands::Train { file } => {
            let form = Form::new().part("file", file_part(&file).await?);
            client
                .post(format!("{}/train", api))
                .multipart(form)
                .send()
                .await?
        }

        Commands::Predict { model_id, file } => {
            let form = Form::new()
                .text("model_id", model_id)
                .part("file", file_part(&file).await?);
            client
                .post(format!("{}/predict", api))
                .multipart(form)
                .send()
                .await?
        }

        Commands::Assets => client.get(format!("{}/assets", api)).send().await?,

        Commands::Asset { id, limit } => {
            let mut request = client.get(format!("{}/assets/{}", api, id));
            if let Some(limit) = limit {
                request = request.query(&[("limit", limit)]);
            }
            request.send().await?
        }

        Commands::Models { id: Some(id) } => {
            client.get(format!("{}/models/{}", api, id)).send().await?
        }

        Commands::Models { id: None } => client.get(format!("{}/models", api)).send().await?,

        Commands::Health => {
            client
                .get(format!("{}/health", cli.endpoint.trim_end_matches('/')))
                .send()
                .await?
        }
    };

    print_json(response).await
}

async fn file_part(path: &Path) -> Result<Part> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());

    Ok(Part::bytes(content).file_name(filename).mime_str("text/csv")?)
}

async fn print_json(response: Response) -> Result<()> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("Server returned a non-JSON body")?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("Request failed with status {}", status);
    }
    Ok(())
}
