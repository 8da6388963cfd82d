//! Terminal commands. These run against the database directly and report
//! with `println!`; errors surface through `anyhow`.

pub mod doctor;
pub mod graph;
pub mod re_embed;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

const MODEL_FILES: [(&str, &str); 2] = [
    (
        "model.onnx",
        "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx",
    ),
    (
        "tokenizer.json",
        "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json",
    ),
];

/// Download the local ONNX model and tokenizer into `embedding.cache_dir`.
/// Files already present are kept.
pub async fn model_download(config: &crate::config::EmbeddingConfig) -> Result<()> {
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    if config.provider != "local" {
        println!(
            "Note: embedding provider is '{}'; the local model is only used with provider = \"local\".",
            config.provider
        );
    }

    for (name, url) in MODEL_FILES {
        let dest = cache_dir.join(name);
        if dest.exists() {
            println!("{name} already present at {}", dest.display());
            continue;
        }
        println!("Downloading {name}...");
        download_file(url, &dest).await?;
        println!("Saved {}", dest.display());
    }

    println!("Local embedding model ready.");
    Ok(())
}

/// Progress bar for `len` items, or a spinner when the length is unknown.
pub(crate) fn progress_bar(len: Option<u64>, template: &str) -> Result<ProgressBar> {
    let Some(len) = len else {
        return Ok(ProgressBar::new_spinner());
    };
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .context("invalid progress template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

/// Fetch `url` into `dest` via a temp file and rename.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = progress_bar(
        response.content_length(),
        "  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
    )?;

    let tmp_path = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    let bytes = response.bytes().await.context("error reading response")?;
    pb.inc(bytes.len() as u64);
    file.write_all(&bytes).await.context("error writing to file")?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to move download into place")?;

    pb.finish_and_clear();
    Ok(())
}

/// Shorten `text` to at most `max` characters for one-line display.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }
}
