//! Packet synchronizer.
//!
//! Recovers aligned 188-byte TS packets from an unframed, append-only byte
//! stream. Segment boundaries and mid-stream corruption routinely misalign
//! the input, so a candidate sync byte is only trusted when a second sync
//! byte shows up exactly one packet later.

use crate::packet::{SYNC_BYTE, TS_PACKET_SIZE};

/// Synchronizer limits.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Hard cap on the internal buffer; the oldest half is dropped when
    /// exceeded.
    pub max_buffer: usize,
    /// How far ahead of a lost sync to scan for a candidate sync byte.
    pub search_window: usize,
    /// Per-`demux` call packet budget, bounding latency per call.
    pub packets_per_call: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_buffer: 2 * 1024 * 1024,
            search_window: 2 * TS_PACKET_SIZE,
            packets_per_call: 50,
        }
    }
}

/// Sliding packet synchronizer over raw bytes.
#[derive(Debug)]
pub struct PacketSynchronizer {
    buffer: Vec<u8>,
    config: SyncConfig,
    resyncs: u64,
}

impl PacketSynchronizer {
    /// Create a synchronizer with default limits.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Create a synchronizer with explicit limits.
    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(config.max_buffer.min(64 * 1024)),
            config,
            resyncs: 0,
        }
    }

    /// Append raw bytes, enforcing the buffer cap.
    pub fn extend(&mut self, bytes: &[u8]) {
        if self.buffer.len() + bytes.len() > self.config.max_buffer {
            let dropped = self.buffer.len() / 2;
            self.buffer.drain(..dropped);
            tracing::warn!(dropped, "sync buffer overflow, oldest half dropped");
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next aligned 188-byte packet, resynchronizing if needed.
    ///
    /// Returns `None` when less than a packet remains buffered, or when
    /// sync was lost and no confirmed candidate exists inside the search
    /// window (the whole buffer is discarded in that case; the caller will
    /// re-seed with fresh input).
    pub fn take_packet(&mut self) -> Option<[u8; TS_PACKET_SIZE]> {
        loop {
            if self.buffer.len() < TS_PACKET_SIZE {
                return None;
            }

            if self.buffer[0] != SYNC_BYTE {
                self.resyncs += 1;
                if !self.resync() {
                    return None;
                }
                continue;
            }

            let mut packet = [0u8; TS_PACKET_SIZE];
            packet.copy_from_slice(&self.buffer[..TS_PACKET_SIZE]);
            self.buffer.drain(..TS_PACKET_SIZE);
            return Some(packet);
        }
    }

    /// Scan forward for a sync byte with a confirming sync one packet
    /// later. On success the leading garbage is discarded; on failure the
    /// entire buffer is dropped.
    fn resync(&mut self) -> bool {
        let limit = self.buffer.len().min(self.config.search_window);

        for i in 1..limit {
            if self.buffer[i] == SYNC_BYTE
                && i + TS_PACKET_SIZE < self.buffer.len()
                && self.buffer[i + TS_PACKET_SIZE] == SYNC_BYTE
            {
                tracing::debug!(skipped = i, "resynchronized to packet boundary");
                self.buffer.drain(..i);
                return true;
            }
        }

        tracing::warn!(
            discarded = self.buffer.len(),
            "sync unrecoverable, buffer discarded"
        );
        self.buffer.clear();
        false
    }

    /// Number of resync events since creation or the last [`clear`].
    ///
    /// [`clear`]: Self::clear
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Per-call packet budget.
    pub fn packets_per_call(&self) -> usize {
        self.config.packets_per_call
    }

    /// Drop all buffered bytes and counters.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.resyncs = 0;
    }
}

impl Default for PacketSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with_pid(pid: u16, cc: u8) -> [u8; TS_PACKET_SIZE] {
        let mut p = [0xFFu8; TS_PACKET_SIZE];
        p[0] = SYNC_BYTE;
        p[1] = (pid >> 8) as u8 & 0x1F;
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10 | (cc & 0x0F);
        p
    }

    #[test]
    fn test_aligned_stream() {
        let mut sync = PacketSynchronizer::new();
        sync.extend(&packet_with_pid(0x100, 0));
        sync.extend(&packet_with_pid(0x100, 1));

        assert!(sync.take_packet().is_some());
        assert!(sync.take_packet().is_some());
        assert!(sync.take_packet().is_none());
        assert_eq!(sync.resyncs(), 0);
    }

    #[test]
    fn test_partial_packet_left_buffered() {
        let mut sync = PacketSynchronizer::new();
        let p = packet_with_pid(0x100, 0);
        sync.extend(&p[..100]);
        assert!(sync.take_packet().is_none());

        sync.extend(&p[100..]);
        assert!(sync.take_packet().is_some());
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut sync = PacketSynchronizer::new();
        sync.extend(&[0xAB; 100]);
        sync.extend(&packet_with_pid(0x100, 0));
        sync.extend(&packet_with_pid(0x100, 1));

        let p = sync.take_packet().unwrap();
        assert_eq!(p[0], SYNC_BYTE);
        assert_eq!(sync.resyncs(), 1);
    }

    #[test]
    fn test_lone_sync_byte_not_trusted() {
        // A 0x47 in garbage with no confirming sync one packet later.
        let mut sync = PacketSynchronizer::new();
        let mut garbage = vec![0xAB; 50];
        garbage[10] = SYNC_BYTE;
        garbage.resize(TS_PACKET_SIZE + 10, 0xCD);
        sync.extend(&garbage);

        assert!(sync.take_packet().is_none());
        // Unconfirmed: the buffer was discarded wholesale.
        assert_eq!(sync.buffered(), 0);

        // Fresh aligned input works immediately afterwards.
        sync.extend(&packet_with_pid(0x100, 0));
        assert!(sync.take_packet().is_some());
    }

    #[test]
    fn test_confirming_sync_required() {
        let mut sync = PacketSynchronizer::new();
        // Fake sync byte at offset 5; the real stream starts at 20.
        let mut data = vec![0x00; 20];
        data[5] = SYNC_BYTE;
        data.extend_from_slice(&packet_with_pid(0x42, 0));
        data.extend_from_slice(&packet_with_pid(0x42, 1));
        sync.extend(&data);

        let p = sync.take_packet().unwrap();
        let pid = ((p[1] as u16 & 0x1F) << 8) | p[2] as u16;
        assert_eq!(pid, 0x42);
    }

    #[test]
    fn test_buffer_cap_drops_oldest_half() {
        let config = SyncConfig {
            max_buffer: 4 * TS_PACKET_SIZE,
            ..SyncConfig::default()
        };
        let mut sync = PacketSynchronizer::with_config(config);

        for cc in 0..4 {
            sync.extend(&packet_with_pid(0x100, cc));
        }
        assert_eq!(sync.buffered(), 4 * TS_PACKET_SIZE);

        // Exceeding the cap halves the buffer before appending.
        sync.extend(&packet_with_pid(0x100, 4));
        assert_eq!(sync.buffered(), 3 * TS_PACKET_SIZE);

        // Remaining packets are still aligned.
        let p = sync.take_packet().unwrap();
        assert_eq!(p[3] & 0x0F, 2);
    }

    #[test]
    fn test_clear() {
        let mut sync = PacketSynchronizer::new();
        sync.extend(&[0x00; 300]);
        let _ = sync.take_packet();
        sync.clear();
        assert_eq!(sync.buffered(), 0);
        assert_eq!(sync.resyncs(), 0);
    }
}
