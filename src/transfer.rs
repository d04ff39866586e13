//! Transfer statistics reported after a sync

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a finished upload or download moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferStats {
    pub bytes_transferred: i64,
    pub blocks_transferred: i64,
    pub project_files_transferred: i64,
    pub transfer_duration: Duration,
}

impl TransferStats {
    pub fn set_bytes_transferred(&mut self, bytes: i64) -> &mut Self {
        self.bytes_transferred = bytes;
        self
    }

    pub fn set_blocks_transferred(&mut self, blocks: i64) -> &mut Self {
        self.blocks_transferred = blocks;
        self
    }

    pub fn set_project_files_transferred(&mut self, files: i64) -> &mut Self {
        self.project_files_transferred = files;
        self
    }

    pub fn set_transfer_duration(&mut self, duration: Duration) -> &mut Self {
        self.transfer_duration = duration;
        self
    }

    /// Average throughput, zero when nothing was timed
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.transfer_duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }
}
