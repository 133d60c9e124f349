//! Durable ledger store
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crashed or failed write never leaves a half-written ledger at the real
//! path. Loads are tolerant: anything unusable yields `None`, not an error.

use atelier_core::{CeremonySession, Result};
use chrono::Utc;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::codec;

/// Ledger filename for a ceremony: `{ceremony_id}.md`
pub fn ledger_filename(ceremony_id: &str) -> String {
    format!("{}.md", ceremony_id)
}

/// Render the session and write its ledger, all-or-nothing.
///
/// The parent directory is created if needed. The rendered document is
/// written to `{ledger_path}.tmp` and renamed over the real path.
pub async fn write_ledger(session: &CeremonySession) -> Result<()> {
    let path = &session.ledger_path;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let text = codec::render(session);

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, text.as_bytes()).await?;
    fs::rename(&tmp, path).await?;

    debug!(
        "Wrote ledger for {} ({} tasks): {}",
        session.ceremony_id,
        session.tasks.len(),
        path.display()
    );
    Ok(())
}

/// Reconstruct a session from an existing ledger file.
///
/// Returns `None` when the file cannot be read, the header cannot be
/// recovered, or no task record survived parsing; a ceremony with zero
/// tasks is not a usable session.
pub async fn load_ledger(path: &Path) -> Option<CeremonySession> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read ledger {}: {}", path.display(), e);
            return None;
        }
    };

    let parsed = codec::parse(&text);
    let metadata = match parsed.metadata {
        Some(metadata) => metadata,
        None => {
            warn!("Ledger {} has no usable header", path.display());
            return None;
        }
    };
    if parsed.tasks.is_empty() {
        warn!("Ledger {} has no readable task records", path.display());
        return None;
    }

    Some(CeremonySession {
        ceremony_id: metadata.ceremony_id,
        name: metadata.name,
        initiator: metadata.initiator,
        intention: metadata.intention,
        status: metadata.status,
        tasks: parsed.tasks,
        ledger_path: path.to_path_buf(),
        created_at: metadata.created_at.unwrap_or_else(Utc::now),
        completed_at: metadata.completed_at,
    })
}
