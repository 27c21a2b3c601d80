//! Command-line upload client for the receipt scan endpoint

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use receipt_scanner::client::{ImageFile, ScanNotifier, SubmitOutcome, UploadClient};

#[derive(Parser)]
#[command(name = "scan-receipt", version, about = "Scan a receipt image with AI")]
struct Cli {
    /// Receipt image to upload
    image: PathBuf,

    /// Scan endpoint URL
    #[arg(long, env = "SCAN_ENDPOINT", default_value = "http://localhost:3000/api/scan")]
    endpoint: String,
}

/// Prints notices to stderr so stdout carries only the result JSON
struct TerminalNotifier;

impl ScanNotifier for TerminalNotifier {
    fn success(&self, message: &str) {
        eprintln!("✓ {}", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("! {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "receipt_scanner=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let file = ImageFile::from_path(&cli.image)
        .await
        .with_context(|| format!("Cannot open {}", cli.image.display()))?;

    let client = UploadClient::new(cli.endpoint, TerminalNotifier);

    let mut scanned = None;
    let outcome = client.submit(file, |result| scanned = Some(result)).await;

    match outcome {
        SubmitOutcome::Delivered => {
            if let Some(result) = scanned {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Ok(())
        }
        SubmitOutcome::Failed(message) => anyhow::bail!(message),
        SubmitOutcome::Rejected => anyhow::bail!("Image exceeds the 5MB upload limit"),
        SubmitOutcome::Busy => anyhow::bail!("A scan is already in progress"),
    }
}
