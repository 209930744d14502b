use std::{
    fmt,
    path::{Path, PathBuf},
};

use clap::Parser;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tubeproxy::picker::{
    FormatChoice, Picker, PickerView, download_label, filename_from_content_disposition,
};
use url::Url;

/// Pick the best MP4 or audio encoding of a video and download it.
#[derive(Debug, Parser)]
#[command(name = "tubeproxy-pick", version)]
struct Args {
    /// Page location carrying `?v=<id>`, or a bare video id.
    location: String,

    /// Base URL of the tubeproxy server.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: Url,

    /// Which option to download. Without it the options are only listed.
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,

    /// Print the download URL instead of saving the file.
    #[arg(long)]
    print_url: bool,

    /// Directory the downloaded file is written to.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tubeproxy=warn".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(message) = run(Args::parse()).await {
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let picker = Picker::new(args.server);
    let view = picker
        .initialize(&args.location)
        .await
        .map_err(|error| error.to_string())?;

    print_view(&view);

    let Some(choice) = args.format else {
        return Ok(());
    };

    let url = picker
        .download_url(&view, choice)
        .map_err(|error| error.to_string())?;

    if args.print_url {
        println!("{url}");
        return Ok(());
    }

    let fallback_name = format!("{}.{}", view.title, choice.extension());
    let path = save_download(url, &args.output_dir, &fallback_name).await?;
    println!("Saved {}", path.display());
    Ok(())
}

fn print_view(view: &PickerView) {
    println!("{}", view.title);
    println!("{}", view.metadata_line());
    if let Some(thumbnail) = &view.thumbnail {
        println!("{thumbnail}");
    }

    for choice in view.options() {
        match view.option(choice) {
            Some(format) => println!("  [{choice}] {} - {}", choice.label(), download_label(format)),
            None => println!("  [{choice}] {} - not available", choice.label()),
        }
    }
}

/// Plays the browser's part: follows the download URL and writes the body to disk.
async fn save_download(url: Url, output_dir: &Path, fallback_name: &str) -> Result<PathBuf, String> {
    let response = reqwest::get(url)
        .await
        .map_err(|error| format!("Download request failed: {error}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(|value| value.as_str()).map(ToString::to_string))
            .unwrap_or_else(|| format!("server responded with {status}"));
        return Err(message);
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_content_disposition)
        .unwrap_or_else(|| fallback_name.to_string());
    let filename = Path::new(&declared)
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "download".into());
    let path = output_dir.join(filename);

    info!("Writing {}", path.display());
    save_body(response.bytes_stream(), &path).await?;
    Ok(path)
}

/// Writes `body` to `path`, removing the file again if the body or a write fails.
async fn save_body<S, C, E>(body: S, path: &Path) -> Result<u64, String>
where
    S: Stream<Item = Result<C, E>>,
    C: AsRef<[u8]>,
    E: fmt::Display,
{
    let result = write_body(body, path).await;
    if result.is_err()
        && let Err(error) = tokio::fs::remove_file(path).await
    {
        warn!("Could not remove partial file {}: {error}", path.display());
    }
    result
}

async fn write_body<S, C, E>(body: S, path: &Path) -> Result<u64, String>
where
    S: Stream<Item = Result<C, E>>,
    C: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|error| format!("Could not create {}: {error}", path.display()))?;

    let mut written: u64 = 0;
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                warn!("Download interrupted after {written} bytes: {error}");
                return Err(format!("Download interrupted: {error}"));
            }
        };
        file.write_all(chunk.as_ref())
            .await
            .map_err(|error| format!("Could not write {}: {error}", path.display()))?;
        written += chunk.as_ref().len() as u64;
    }

    file.flush()
        .await
        .map_err(|error| format!("Could not write {}: {error}", path.display()))?;
    Ok(written)
}
