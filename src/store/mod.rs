//! Two-tier state store: ephemeral live rounds, durable match history

pub mod archive;
pub mod ephemeral;
pub mod supabase;

pub use archive::{ArchiveJob, ArchiveWriter, CheckpointRecord, GameRecord, MatchArchive, MemoryArchive, ParticipantRecord};
pub use ephemeral::EphemeralStore;
pub use supabase::{StoreError, SupabaseArchive, SupabaseClient};
