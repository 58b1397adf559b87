use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::InventoryArgs;
use crate::commands::process::detect_input_kind;
use crate::model::{SourceEntry, SourceInventoryManifest};
use crate::util::{modified_at_utc, now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.input_dir)?;

    if args.dry_run {
        info!(
            document_count = manifest.document_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.cache_root
            .join("manifests")
            .join("source_inventory.json")
    });

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(document_count = manifest.document_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(input_dir: &Path) -> Result<SourceInventoryManifest> {
    let mut paths = discover_documents(input_dir)?;
    paths.sort();

    if paths.is_empty() {
        bail!("no supported documents found in {}", input_dir.display());
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        let kind = detect_input_kind(&path)
            .map(|kind| kind.as_str().to_string())
            .unwrap_or_default();

        documents.push(SourceEntry {
            filename,
            kind,
            modified_at: modified_at_utc(&path)?,
            sha256: sha256_file(&path)?,
        });
    }

    Ok(SourceInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: input_dir.display().to_string(),
        document_count: documents.len(),
        documents,
    })
}

fn discover_documents(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        if detect_input_kind(&path).is_some() {
            documents.push(path);
        }
    }

    Ok(documents)
}
