//! Cleanup Module
//!
//! Periodic background sweep removing expired entries from both cache
//! layers and expired TTS token records. Lazy expiry on read already keeps
//! results correct; the sweep reclaims memory and disk for keys nobody
//! reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{FilesystemAdapter, MemoryAdapter};
use crate::token::TtsTokenService;

/// Spawns the periodic cleanup task.
///
/// Runs forever; the returned handle is used to abort it on shutdown.
pub fn spawn_cleanup_task(
    memory: Arc<MemoryAdapter>,
    filesystem: Arc<FilesystemAdapter>,
    tts_tokens: TtsTokenService,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick fires immediately; skip it so startup stays quiet
        interval.tick().await;

        loop {
            interval.tick().await;

            let from_memory = memory.cleanup_expired().await;
            let from_disk = filesystem.cleanup_expired().await;
            let tts = match tts_tokens.cleanup_expired().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("TTS token cleanup failed: {}", e);
                    0
                }
            };

            if from_memory + from_disk + tts > 0 {
                debug!(
                    "Cleanup removed {} memory, {} disk, {} tts token entries",
                    from_memory, from_disk, tts
                );
            }
        }
    })
}
