use quitus_core::hash::file_digest;
use quitus_core::{note_path, ArtifactNote};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::normalize::decimal_to_cents;
use crate::patterns::{amount_from_name, extract_identifier};
use crate::receipt_match::ReceiptCandidate;

pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DOCUMENT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Candidate for a single artifact. The identifier, digest and amount come
/// from the sidecar note when there is one; a note without an amount leaves
/// it to the file name.
pub fn candidate_from_path(path: &Path) -> std::io::Result<ReceiptCandidate> {
    let note = match std::fs::read_to_string(note_path(path)) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let parsed = note.as_deref().and_then(ArtifactNote::parse);
    let identifier = match (&parsed, &note) {
        (Some(n), _) => extract_identifier(&n.payment_id),
        (None, Some(text)) => extract_identifier(text),
        (None, None) => None,
    };

    let amount_cents = match parsed.as_ref().and_then(|n| n.amount) {
        Some(amount) => decimal_to_cents(amount),
        None => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            amount_from_name(&name)
        }
    };

    let digest = match parsed.and_then(|n| n.sha256) {
        Some(d) => d,
        None => file_digest(path)?,
    };

    Ok(ReceiptCandidate {
        path: path.to_path_buf(),
        identifier,
        amount_cents,
        digest: Some(digest),
    })
}

/// Every document in `dir` (not recursive), in file-name order. Artifacts
/// with the same content digest are loaded once.
pub fn load_candidates(dir: &Path) -> std::io::Result<Vec<ReceiptCandidate>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_document(p))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for path in paths {
        let candidate = candidate_from_path(&path)?;
        if let Some(digest) = &candidate.digest {
            if !seen.insert(digest.clone()) {
                tracing::debug!(path = %path.display(), "duplicate artifact skipped");
                continue;
            }
        }
        candidates.push(candidate);
    }

    tracing::info!(dir = %dir.display(), count = candidates.len(), "receipt candidates loaded");
    Ok(candidates)
}
