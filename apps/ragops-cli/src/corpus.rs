//! Turns a directory of `.txt` files into chunks, one per paragraph.
//!
//! The first path component below the root names the domain; files placed
//! directly in the root land in `general`.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use ragops_core::domain::Domain;
use ragops_core::traits::EmbedProvider;
use ragops_core::types::Chunk;

pub struct Paragraph {
    pub id: String,
    pub text: String,
    pub domain: Domain,
    pub source: String,
    pub index: usize,
}

pub fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    files.sort();
    files
}

fn domain_for(relative: &Path) -> Option<Domain> {
    let mut components = relative.components();
    let first = components.next()?;
    components.next()?;
    let name = first.as_os_str().to_string_lossy().to_lowercase();
    match Domain::parse(&name) {
        Ok(domain) => Some(domain),
        Err(e) => {
            tracing::warn!(path = %relative.display(), error = %e, "skipping file with unusable domain directory");
            None
        }
    }
}

fn read_lossy(path: &Path) -> anyhow::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path).with_context(|| format!("reading {}", path.display()))?).to_string()),
    }
}

pub fn split_paragraphs(content: &str) -> impl Iterator<Item = &str> {
    content.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

pub fn read_paragraphs(root: &Path) -> anyhow::Result<Vec<Paragraph>> {
    let files = list_txt_files(root);
    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));

    let mut out = Vec::new();
    for path in &files {
        bar.inc(1);
        let relative = path.strip_prefix(root).unwrap_or(path);
        let domain = if relative.components().count() > 1 {
            match domain_for(relative) {
                Some(d) => d,
                None => continue,
            }
        } else {
            Domain::general()
        };
        let source = relative.to_string_lossy().to_string();
        bar.set_message(source.clone());
        let content = read_lossy(path)?;
        for (index, text) in split_paragraphs(&content).enumerate() {
            out.push(Paragraph { id: format!("{source}:{index}"), text: text.to_string(), domain: domain.clone(), source: source.clone(), index });
        }
    }
    bar.finish_and_clear();
    tracing::info!(files = files.len(), paragraphs = out.len(), root = %root.display(), "read corpus");
    Ok(out)
}

pub async fn embed_paragraphs(paragraphs: Vec<Paragraph>, embedder: &dyn EmbedProvider) -> anyhow::Result<Vec<Chunk>> {
    let texts: Vec<String> = paragraphs.iter().map(|p| p.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    Ok(paragraphs
        .into_iter()
        .zip(embeddings)
        .map(|(p, embedding)| Chunk::new(p.id, p.text, embedding, &p.domain, p.source, p.index))
        .collect())
}
