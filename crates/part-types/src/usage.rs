/// Snapshot of used and total bytes on a filesystem, taken once before any
/// shrink decision is made.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilesystemUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl FilesystemUsage {
    pub fn free_bytes(&self) -> u64 { self.total_bytes.saturating_sub(self.used_bytes) }
}
