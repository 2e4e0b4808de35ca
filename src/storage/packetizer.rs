//! Deterministic packetization
//!
//! The authoritative definition of on-disk layout: packet `k` of
//! submanifest `m` occupies the byte range starting at
//! `(m * submanifest_size + k) * packet_size` of its file. The same
//! arithmetic drives cutting a file into signed packets, writing a
//! received packet into place, and re-reading a packet to serve it.

use std::io::SeekFrom;
use std::path::Path;

use anyhow::Result;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::metadata::{Data, FileManifest, KeyChain};
use crate::name::Name;

/// Byte offset of packet `packet_number` of submanifest
/// `submanifest_number` within its file.
pub fn packet_offset(
    submanifest_number: u64,
    submanifest_size: u64,
    packet_number: u64,
    packet_size: u64,
) -> u64 {
    (submanifest_number * submanifest_size + packet_number) * packet_size
}

/// Cut one submanifest's worth of signed packets out of the file at
/// `path`. Packet names extend `manifest_name` with the packet
/// number; the last packet may be short.
pub async fn packetize_file(
    path: &Path,
    manifest_name: &Name,
    packet_size: u64,
    submanifest_size: u64,
    submanifest_number: u64,
    key_chain: &KeyChain,
) -> Result<Vec<Data>> {
    let mut file = fs::File::open(path).await.map_err(|e| {
        EngineError::storage_error_full(
            "Failed to open file for packetizing",
            path.display().to_string(),
            e.to_string(),
        )
    })?;
    let start = packet_offset(submanifest_number, submanifest_size, 0, packet_size);
    file.seek(SeekFrom::Start(start)).await?;

    let mut packets = Vec::new();
    for packet_number in 0..submanifest_size {
        let mut buf = vec![0u8; packet_size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        buf.truncate(filled);
        let name = manifest_name.clone().append_sequence(packet_number);
        packets.push(Data::signed(name, buf, key_chain));
    }
    trace!(
        "packetized {} packets of submanifest {} from {}",
        packets.len(),
        submanifest_number,
        path.display()
    );
    Ok(packets)
}

/// Write a received packet's bytes to their computed offset in the
/// file at `path`, creating or extending the file as needed.
pub async fn write_packet(
    packet: &Data,
    manifest: &FileManifest,
    submanifest_size: u64,
    path: &Path,
) -> Result<()> {
    let packet_number = packet
        .name()
        .get(-1)
        .and_then(|c| c.to_sequence_number())
        .ok_or_else(|| {
            EngineError::parse_error(format!("packet name {} has no packet number", packet.name()))
        })?;
    let submanifest_number = manifest.submanifest_number().ok_or_else(|| {
        EngineError::parse_error(format!(
            "manifest name {} has no submanifest number",
            manifest.name()
        ))
    })?;
    let offset = packet_offset(
        submanifest_number,
        submanifest_size,
        packet_number,
        manifest.packet_size(),
    );

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| {
            EngineError::storage_error_full(
                "Failed to open file for writing",
                path.display().to_string(),
                e.to_string(),
            )
        })?;
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(packet.content()).await?;
    file.flush().await?;
    debug!(
        "wrote packet {} ({} bytes at offset {})",
        packet.name(),
        packet.content().len(),
        offset
    );
    Ok(())
}

/// Re-read the packet addressed by the full name `name` from disk
/// and reconstruct the signed object.
pub async fn read_packet(
    name: &Name,
    manifest: &FileManifest,
    submanifest_size: u64,
    path: &Path,
    key_chain: &KeyChain,
) -> Result<Data> {
    let packet_number = name
        .get(-2)
        .and_then(|c| c.to_sequence_number())
        .ok_or_else(|| {
            EngineError::parse_error(format!("request name {} has no packet number", name))
        })?;
    let submanifest_number = manifest.submanifest_number().ok_or_else(|| {
        EngineError::parse_error(format!(
            "manifest name {} has no submanifest number",
            manifest.name()
        ))
    })?;
    let packet_size = manifest.packet_size();
    let offset = packet_offset(submanifest_number, submanifest_size, packet_number, packet_size);

    let mut file = fs::File::open(path).await.map_err(|e| {
        EngineError::storage_error_full(
            "Failed to open file for reading",
            path.display().to_string(),
            e.to_string(),
        )
    })?;
    let file_len = file.metadata().await?.len();
    if offset >= file_len {
        return Err(EngineError::storage_error_with_path(
            format!("packet offset {} beyond end of file", offset),
            path.display().to_string(),
        )
        .into());
    }
    let len = packet_size.min(file_len - offset) as usize;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;

    let packet_name = manifest.name().clone().append_sequence(packet_number);
    Ok(Data::signed(packet_name, buf, key_chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manifest_for(sub: u64, packet_size: u64, catalog: Vec<Name>) -> FileManifest {
        FileManifest::new(
            Name::parse("/ndn/demo/file.bin").append_sequence(sub),
            packet_size,
            catalog,
            None,
        )
    }

    #[test]
    fn test_packet_offset_arithmetic() {
        assert_eq!(packet_offset(0, 4, 0, 16), 0);
        assert_eq!(packet_offset(0, 4, 3, 16), 48);
        assert_eq!(packet_offset(2, 4, 1, 16), 144);
    }

    #[tokio::test]
    async fn test_packetize_names_and_short_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        // 2 full packets of 4 bytes plus a 2-byte tail.
        fs::write(&path, b"aaaabbbbcc").await.unwrap();

        let kc = KeyChain::new();
        let manifest_name = Name::parse("/ndn/demo/file.bin").append_sequence(0);
        let packets = packetize_file(&path, &manifest_name, 4, 8, 0, &kc)
            .await
            .unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].content(), b"aaaa");
        assert_eq!(packets[2].content(), b"cc");
        assert_eq!(
            packets[1].name(),
            &manifest_name.clone().append_sequence(1)
        );
        assert!(packets.iter().all(|p| p.verify(&kc)));
    }

    #[tokio::test]
    async fn test_packetize_second_submanifest_starts_at_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        // Submanifests of 2 packets x 4 bytes.
        fs::write(&path, b"aaaabbbbccccdddd").await.unwrap();

        let kc = KeyChain::new();
        let manifest_name = Name::parse("/ndn/demo/file.bin").append_sequence(1);
        let packets = packetize_file(&path, &manifest_name, 4, 2, 1, &kc)
            .await
            .unwrap();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].content(), b"cccc");
        assert_eq!(packets[1].content(), b"dddd");
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let kc = KeyChain::new();
        let manifest = manifest_for(0, 4, Vec::new());

        let packet = Data::signed(
            manifest.name().clone().append_sequence(2),
            &b"wxyz"[..],
            &kc,
        );
        write_packet(&packet, &manifest, 8, &path).await.unwrap();

        let request = packet.full_name().unwrap();
        let read_back = read_packet(&request, &manifest, 8, &path, &kc).await.unwrap();
        assert_eq!(read_back.content(), b"wxyz");
        assert_eq!(read_back.full_name().unwrap(), request);
    }

    #[tokio::test]
    async fn test_out_of_order_writes_make_contiguous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let kc = KeyChain::new();
        let manifest = manifest_for(0, 4, Vec::new());

        for (number, bytes) in [(2u64, &b"2222"[..]), (0, &b"0000"[..]), (1, &b"1111"[..])] {
            let packet = Data::signed(
                manifest.name().clone().append_sequence(number),
                bytes,
                &kc,
            );
            write_packet(&packet, &manifest, 8, &path).await.unwrap();
        }

        let on_disk = fs::read(&path).await.unwrap();
        assert_eq!(on_disk, b"000011112222");
    }
}
