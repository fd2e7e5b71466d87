//! Command line access to blobs stored in a COS bucket.

use blob_storage::{BlobStorage as _, CancellationToken, Digest, FileSource, ObjectKey};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use cos_client::{CosClient, CosConfig};
use eyre::{Context as _, OptionExt as _};
use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

#[derive(Parser)]
#[command(name = "cos-blob")]
#[command(about = "Store and fetch content-addressed blobs in a COS bucket")]
#[command(version)]
struct Cli {
    /// Configuration file. Without one, settings are read from COS_* variables.
    #[arg(long, short, env = "COS_CONFIG")]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file, printing its location
    Put {
        /// File to upload
        file: Utf8PathBuf,

        /// Digest of the file, computed as sha256 when omitted
        #[arg(long)]
        digest: Option<String>,

        /// Repository the blob belongs to, for logging
        #[arg(long, default_value = "cli")]
        repository: String,
    },
    /// Check whether a blob exists
    Stat {
        /// Digest of the blob, e.g. sha256:abcd...
        digest: String,
    },
    /// Print a download URL for a blob
    Url {
        /// Location of the blob
        location: String,
    },
    /// Download a blob
    Get {
        /// Location of the blob
        location: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<Utf8PathBuf>,
    },
    /// Delete a blob
    Rm {
        /// Location of the blob
        location: String,
    },
}

async fn load_config(path: Option<&Utf8Path>) -> eyre::Result<CosConfig> {
    match path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .wrap_err_with(|| format!("reading {path}"))?;
            toml_edit::de::from_str(&text).wrap_err_with(|| format!("parsing {path}"))
        }
        None => CosConfig::from_env().wrap_err("reading configuration from the environment"),
    }
}

async fn sha256_file(path: &Utf8Path) -> eyre::Result<Digest> {
    let mut file = tokio::fs::File::open(path)
        .await
        .wrap_err_with(|| format!("opening {path}"))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Digest::parse(&format!(
        "sha256:{}",
        hex::encode(hasher.finalize())
    ))?)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;
    let storage = CosClient::new(config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Command::Put {
            file,
            digest,
            repository,
        } => {
            let digest = match digest {
                Some(digest) => Digest::parse(&digest)?,
                None => sha256_file(&file).await?,
            };
            let source = FileSource::new(file.clone())
                .await
                .wrap_err_with(|| format!("opening {file}"))?;

            let location = storage.save(&source, &digest, &repository, &cancel).await?;
            println!("{location}");
        }
        Command::Stat { digest } => {
            let digest = Digest::parse(&digest)?;
            let location = storage
                .try_locate_existing(&digest)
                .await?
                .ok_or_eyre("blob not found")?;
            println!("{location}");
        }
        Command::Url { location } => {
            println!("{}", storage.download_url(&ObjectKey::new(location))?);
        }
        Command::Get { location, output } => {
            let mut reader = storage.read(&ObjectKey::new(location), &cancel).await?;
            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .wrap_err_with(|| format!("creating {path}"))?;
                    tokio::io::copy_buf(&mut reader, &mut file).await?;
                    file.flush().await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy_buf(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Rm { location } => {
            storage.delete(&ObjectKey::new(location)).await?;
        }
    }

    Ok(())
}
