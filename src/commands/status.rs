use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{ProcessRunManifest, SourceInventoryManifest};

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let inventory_path = manifest_dir.join("source_inventory.json");
    let db_path = args
        .db_path
        .unwrap_or_else(|| args.cache_root.join("pagesift_log.sqlite"));

    info!(cache_root = %args.cache_root.display(), "status requested");

    if inventory_path.exists() {
        let raw = fs::read(&inventory_path)
            .with_context(|| format!("failed to read {}", inventory_path.display()))?;
        let inventory: SourceInventoryManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", inventory_path.display()))?;

        info!(
            generated_at = %inventory.generated_at,
            document_count = inventory.document_count,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    match latest_run_manifest(&manifest_dir)? {
        Some((path, manifest)) => {
            info!(
                path = %path.display(),
                run_id = %manifest.run_id,
                status = %manifest.status,
                keyword = %manifest.keyword,
                documents = manifest.counts.document_count,
                matches = manifest.counts.match_count,
                outputs = manifest.counts.output_documents_written,
                failed = manifest.counts.failed_document_count,
                "latest process run"
            );
        }
        None => {
            warn!(path = %manifest_dir.display(), "no process run manifests found");
        }
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let extraction_count =
            query_count(&conn, "SELECT COUNT(*) FROM extractions").unwrap_or(0);
        let keyword_count =
            query_count(&conn, "SELECT COUNT(DISTINCT keyword) FROM extractions").unwrap_or(0);

        info!(
            path = %db_path.display(),
            extractions = extraction_count,
            keywords = keyword_count,
            "log store status"
        );
    } else {
        warn!(path = %db_path.display(), "log database missing");
    }

    Ok(())
}

fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<(PathBuf, ProcessRunManifest)>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with("process_run_") && name.ends_with(".json") {
            candidates.push(path);
        }
    }

    // Run manifests carry a sortable compact timestamp in the filename.
    candidates.sort();
    let Some(path) = candidates.pop() else {
        return Ok(None);
    };

    let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: ProcessRunManifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    Ok(Some((path, manifest)))
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
