//! Package download

use std::path::Path;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use crate::common::{Error, Result};

/// Download a file with progress reporting
pub async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("User-Agent", "dmf")
        .send()
        .await
        .map_err(|e| Error::Install(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::Install(format!(
            "Download failed with status {}: {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = if total_size > 0 {
        let pb = ProgressBar::new(total_size);
        let style = ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map_err(|e| Error::Internal(e.to_string()))?
            .progress_chars("=> ");
        pb.set_style(style);
        Some(pb)
    } else {
        println!("  Downloading...");
        None
    };

    let mut file = tokio::fs::File::create(dest).await.map_err(|e| Error::FileWrite {
        path: dest.display().to_string(),
        error: e.to_string(),
    })?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Install(format!("Download error: {}", e)))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        downloaded += chunk.len() as u64;
        if let Some(ref pb) = pb {
            pb.set_position(downloaded);
        }
    }
    tokio::io::AsyncWriteExt::flush(&mut file).await?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    tracing::info!("Downloaded {} ({} bytes)", url, downloaded);

    Ok(())
}
