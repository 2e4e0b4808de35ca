//! ndn-torrent
//!
//! A peer-to-peer file distribution engine over a Named Data
//! Networking substrate: content is addressed by hierarchical names,
//! described by a three-tier manifest tree, downloaded with windowed
//! request pipelining, and re-served as it becomes locally complete.

pub mod error;
pub mod face;
pub mod manager;
pub mod metadata;
pub mod name;
pub mod peers;
pub mod storage;

pub mod cli;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::EngineError;

pub use cli::{CliArgs, Config, ProgressDisplay};

pub use face::{Face, FaceEvent, Interest, MemoryFace};
pub use manager::{ManagerConfig, ManagerEvent, TorrentManager};
pub use metadata::{Data, FileManifest, KeyChain, NameType, TorrentSegment};
pub use name::{Component, Name};
pub use peers::{PeerCursor, PeerRecord, StatsTable, UpdateHandler};
pub use storage::{FileState, StoreLayout};
