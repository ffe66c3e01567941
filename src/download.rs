//! Streams datasets behind access URLs to local files.

use crate::dal::check_status;
use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Fetches `url` into `dest`.
///
/// When `dest` is a directory, the file name is taken from the last segment
/// of the URL path. With `progress` set, a progress bar is drawn, sized from
/// `Content-Length` when the server sends one.
pub async fn fetch_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    progress: bool,
) -> Result<PathBuf> {
    let path = if dest.is_dir() {
        dest.join(filename_from_url(url))
    } else {
        dest.to_path_buf()
    };

    info!("Downloading {} to {}", url, path.display());
    let mut response = check_status(client.get(url).send().await?)?;
    let total = response.content_length();

    let bar = if progress {
        Some(make_bar(total)?)
    } else {
        None
    };

    let mut file = tokio::fs::File::create(&path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(bar) = &bar {
            bar.inc(chunk.len() as u64);
        }
    }
    file.flush().await?;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    debug!("Wrote {} bytes to {}", written, path.display());
    Ok(path)
}

fn make_bar(total: Option<u64>) -> Result<ProgressBar> {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
                )?
                .progress_chars("#>-"),
            );
            bar
        },
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template("{spinner} {bytes} downloaded")?);
            bar
        },
    };
    Ok(bar)
}

/// Last non-empty URL path segment, with a fallback for opaque URLs.
fn filename_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download.dat".to_string())
}
