use api_shared::auth::TokenIssuer;
use ark_core::config::expand_home;
use ark_files::DirectoryWalker;
use ark_importer::{default_workers, GrpcUploader, UploadDispatcher};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILE_TYPES: &str = "cr2,orf,jpg,jpeg,heic,tiff,mp4,mov,avi,mpg,mpeg,wmv";

#[derive(Parser, Debug)]
#[command(name = "ark")]
#[command(about = "Import photos and videos into an Ark archive")]
struct Cli {
    /// Directory to import from (`~` is expanded)
    #[arg(long)]
    from: String,

    /// Comma-separated file extensions to import
    #[arg(long, env = "ARK_CLIENT_FILE_TYPES", default_value = DEFAULT_FILE_TYPES, value_delimiter = ',')]
    file_types: Vec<String>,

    /// Shared key used to sign request tokens
    #[arg(long, env = "ARK_CLIENT_SIGNING_KEY", hide_env_values = true)]
    signing_key: String,

    #[arg(long, env = "ARK_CLIENT_SERVER_ADDRESS", default_value = "localhost:9999")]
    server_address: String,

    #[arg(long, env = "ARK_CLIENT_SERVER_PROTOCOL", default_value = "http")]
    server_protocol: String,

    /// Number of concurrent uploads (defaults to the number of CPUs)
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    fn server_url(&self) -> String {
        format!("{}://{}", self.server_protocol, self.server_address)
    }

    fn source(&self) -> anyhow::Result<PathBuf> {
        let source = expand_home(self.from.trim())?;
        if !source.is_dir() {
            anyhow::bail!("{} is not a directory", source.display());
        }
        Ok(source)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ark=info".parse()?)
                .add_directive("ark_importer=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let source = cli.source()?;
    let workers = cli.workers.unwrap_or_else(default_workers);
    let url = cli.server_url();

    let issuer = TokenIssuer::new(cli.signing_key.as_bytes())?;
    let uploader = GrpcUploader::connect(&url, &issuer).await?;
    let dispatcher = UploadDispatcher::new(uploader).with_workers(workers);

    let cancel = dispatcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling uploads");
            cancel.cancel();
        }
    });

    tracing::info!(
        source = %source.display(),
        server = %url,
        workers = dispatcher.workers(),
        "starting import"
    );

    let started = Instant::now();
    let items = DirectoryWalker::new(&cli.file_types).walk(&source)?;
    let summary = dispatcher.run(items).await?;

    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        elapsed = ?started.elapsed(),
        "done"
    );
    Ok(())
}
