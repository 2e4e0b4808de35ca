//! Record persistence
//!
//! Torrent segments and submanifests are bencoded to one file each.
//! File names are chosen so that plain directory order is segment
//! order (and, for manifests, groups submanifests of one file in
//! submanifest order), which the startup chain-walk relies on.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::metadata::keychain::{append_name_bytes, sha256};
use crate::metadata::{FileManifest, TorrentSegment};
use crate::name::Name;

const SEGMENT_EXTENSION: &str = "seg";
const MANIFEST_EXTENSION: &str = "sub";

async fn directory_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        EngineError::storage_error_full(
            "Failed to read store directory",
            dir.display().to_string(),
            e.to_string(),
        )
    })?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name_tag(file_name: &Name) -> String {
    let mut buf = Vec::new();
    append_name_bytes(&mut buf, file_name);
    hex::encode(&sha256(&buf)[..8])
}

fn segment_record_name(segment: &TorrentSegment) -> String {
    format!(
        "{:020}.{}",
        segment.segment_number().unwrap_or(0),
        SEGMENT_EXTENSION
    )
}

fn manifest_record_name(manifest: &FileManifest) -> String {
    format!(
        "{}-{:020}.{}",
        file_name_tag(&manifest.file_name()),
        manifest.submanifest_number().unwrap_or(0),
        MANIFEST_EXTENSION
    )
}

/// Load all torrent segment records from `dir` in directory order.
/// Records that fail to decode are skipped.
pub async fn load_segments(dir: &Path) -> Result<Vec<TorrentSegment>> {
    let mut segments = Vec::new();
    for path in directory_entries(dir).await? {
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXTENSION) {
            continue;
        }
        let bytes = fs::read(&path).await?;
        match TorrentSegment::decode(&bytes) {
            Ok(segment) => segments.push(segment),
            Err(e) => warn!("skipping undecodable segment record {}: {}", path.display(), e),
        }
    }
    debug!("loaded {} torrent segments from {}", segments.len(), dir.display());
    Ok(segments)
}

/// Load all submanifest records from `dir` in directory order.
/// Records that fail to decode are skipped.
pub async fn load_manifests(dir: &Path) -> Result<Vec<FileManifest>> {
    let mut manifests = Vec::new();
    for path in directory_entries(dir).await? {
        if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
            continue;
        }
        let bytes = fs::read(&path).await?;
        match FileManifest::decode(&bytes) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => warn!(
                "skipping undecodable manifest record {}: {}",
                path.display(),
                e
            ),
        }
    }
    debug!("loaded {} submanifests from {}", manifests.len(), dir.display());
    Ok(manifests)
}

/// Persist one torrent segment record into `dir`.
pub async fn write_segment(segment: &TorrentSegment, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(segment_record_name(segment));
    let bytes = segment.encode()?;
    fs::write(&path, bytes).await.map_err(|e| {
        EngineError::storage_error_full(
            "Failed to write segment record",
            path.display().to_string(),
            e.to_string(),
        )
    })?;
    debug!("stored segment {} at {}", segment.name(), path.display());
    Ok(())
}

/// Persist one submanifest record into `dir`.
pub async fn write_manifest(manifest: &FileManifest, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(manifest_record_name(manifest));
    let bytes = manifest.encode()?;
    fs::write(&path, bytes).await.map_err(|e| {
        EngineError::storage_error_full(
            "Failed to write manifest record",
            path.display().to_string(),
            e.to_string(),
        )
    })?;
    debug!("stored manifest {} at {}", manifest.name(), path.display());
    Ok(())
}

/// Whether `name`'s record directory exists on disk.
pub async fn exists(dir: &Path) -> bool {
    fs::metadata(dir).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{KeyChain, TORRENT_FILE_COMPONENT};
    use tempfile::tempdir;

    fn signed_segment(seq: u64, kc: &KeyChain) -> TorrentSegment {
        let mut segment = TorrentSegment::new(
            Name::parse("/ndn/demo")
                .append_str(TORRENT_FILE_COMPONENT)
                .append_sequence(seq),
            Vec::new(),
            None,
        );
        segment.sign(kc).unwrap();
        segment
    }

    fn signed_manifest(file: &str, sub: u64, kc: &KeyChain) -> FileManifest {
        let mut manifest =
            FileManifest::new(Name::parse(file).append_sequence(sub), 1024, Vec::new(), None);
        manifest.sign(kc).unwrap();
        manifest
    }

    #[tokio::test]
    async fn test_segments_load_in_segment_order() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        // Stored out of order; directory order is segment order.
        for seq in [2u64, 0, 1] {
            write_segment(&signed_segment(seq, &kc), dir.path()).await.unwrap();
        }

        let loaded = load_segments(dir.path()).await.unwrap();
        let numbers: Vec<_> = loaded.iter().filter_map(|s| s.segment_number()).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_manifests_group_by_file_in_submanifest_order() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        write_manifest(&signed_manifest("/ndn/demo/b.bin", 1, &kc), dir.path())
            .await
            .unwrap();
        write_manifest(&signed_manifest("/ndn/demo/a.bin", 0, &kc), dir.path())
            .await
            .unwrap();
        write_manifest(&signed_manifest("/ndn/demo/b.bin", 0, &kc), dir.path())
            .await
            .unwrap();

        let loaded = load_manifests(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 3);
        // Submanifests of the same file are adjacent and ascending.
        let positions: Vec<_> = loaded
            .iter()
            .map(|m| (m.file_name(), m.submanifest_number().unwrap()))
            .collect();
        let b_subs: Vec<_> = positions
            .iter()
            .filter(|(f, _)| *f == Name::parse("/ndn/demo/b.bin"))
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(b_subs, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_undecodable_records_are_skipped() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        write_segment(&signed_segment(0, &kc), dir.path()).await.unwrap();
        fs::write(dir.path().join("junk.seg"), b"not bencode")
            .await
            .unwrap();

        let loaded = load_segments(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(!exists(&missing).await);
        assert!(load_segments(&missing).await.is_err());
    }
}
