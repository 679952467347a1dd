//! Adaptive FEC protection-factor calculation.
//!
//! Decides, from current network and codec conditions, how many FlexFEC
//! repair packets a protection group of a given size should receive. Network
//! stats are pushed in from the congestion-control side (RTT from
//! [`crate::cc::delay_controller`], loss ratio from
//! [`crate::cc::loss_controller`]) rather than pulled, so this module has no
//! dependency on how those estimates are produced.

use std::time::Duration;

/// Below this loss ratio, FEC is skipped entirely: the cost outweighs the
/// benefit at near-zero loss.
const SKIP_LOSS_RATIO: f32 = 0.005;

/// Above this RTT, a NACK retransmission round-trip is cheap enough that
/// FEC is not worth its bandwidth overhead.
const SKIP_RTT: Duration = Duration::from_millis(200);

/// Key-frame protection factor is boosted to at least this floor once RTT
/// crosses this threshold, since a lost key frame stalls the whole stream
/// until the next one.
const HIGH_RTT_KEY_FLOOR_THRESHOLD: Duration = Duration::from_millis(100);
const HIGH_RTT_KEY_FLOOR: u8 = 30;

/// Key-frame protection is this many times the delta-frame factor, clamped
/// to [u8::MAX].
const KEY_FRAME_SCALE: f32 = 2.5;

/// Resolution-dependent bitrate-per-frame floor below which FEC adds more
/// overhead than it recovers.
fn bitrate_floor_bytes_per_frame(width: u32, height: u32) -> f32 {
    let pixels = width * height;
    if pixels <= 352 * 288 {
        400.0
    } else if pixels <= 640 * 480 {
        700.0
    } else {
        1000.0
    }
}

/// Current network and codec conditions feeding the calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStats {
    pub rtt: Duration,
    pub loss_ratio: f32,
    pub available_bitrate_bps: u32,
    pub frame_rate: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct CodecParams {
    pub width: u32,
    pub height: u32,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Resolved protection factors, each a ratio in `0..=255` of FEC packets to
/// media packets (`255` meaning 1:1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProtectionParams {
    pub protection_factor_delta: u8,
    pub protection_factor_key: u8,
}

pub struct ProtectionCalculator {
    stats: NetworkStats,
    codec: CodecParams,
}

impl Default for ProtectionCalculator {
    fn default() -> Self {
        Self {
            stats: NetworkStats {
                frame_rate: 30.0,
                ..Default::default()
            },
            codec: CodecParams::default(),
        }
    }
}

impl ProtectionCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_network_stats(&mut self, stats: NetworkStats) {
        self.stats = stats;
    }

    pub fn update_codec_params(&mut self, codec: CodecParams) {
        self.codec = codec;
    }

    /// Resolves the current protection factors for delta and key frames.
    pub fn protection_params(&self) -> ProtectionParams {
        if self.stats.loss_ratio < SKIP_LOSS_RATIO || self.stats.rtt > SKIP_RTT {
            return ProtectionParams::default();
        }

        let bits_per_frame = if self.stats.frame_rate > 0.0 {
            self.stats.available_bitrate_bps as f32 / self.stats.frame_rate
        } else {
            0.0
        };
        let bytes_per_frame = bits_per_frame / 8.0;
        if bytes_per_frame < bitrate_floor_bytes_per_frame(self.codec.width, self.codec.height) {
            return ProtectionParams::default();
        }

        let delta_factor = lookup_protection_factor(bits_per_frame, self.stats.loss_ratio);

        let mut key_factor = ((delta_factor as f32) * KEY_FRAME_SCALE).min(255.0) as u8;
        if self.stats.rtt > HIGH_RTT_KEY_FLOOR_THRESHOLD && key_factor < HIGH_RTT_KEY_FLOOR {
            key_factor = HIGH_RTT_KEY_FLOOR;
        }

        ProtectionParams {
            protection_factor_delta: delta_factor,
            protection_factor_key: key_factor,
        }
    }

    /// Converts a protection factor (ratio of FEC to media packets, 0-255)
    /// into a concrete repair-packet count for a group of `media_packet_count`
    /// packets, capped at half the group so FEC never dominates media
    /// traffic.
    pub fn fec_count(protection_factor: u8, media_packet_count: usize) -> u32 {
        if media_packet_count == 0 || protection_factor == 0 {
            return 0;
        }
        let ratio = (protection_factor as f64 / 255.0).min(0.9);
        let count = (ratio * media_packet_count as f64).round() as u32;
        count.min((media_packet_count / 2) as u32)
    }
}

/// Per-frame bitrate bucket boundaries (bits/frame), lowest bucket first.
/// Frames carrying more bits recover more of the frame from a single XOR
/// repair, so the bucket with the least protection need is last.
const RATE_BUCKET_CEILINGS: [f32; 4] = [50_000.0, 100_000.0, 200_000.0, 400_000.0];

/// Loss-ratio bucket boundaries, lowest bucket first.
const LOSS_BUCKET_CEILINGS: [f32; 5] = [0.02, 0.05, 0.10, 0.20, 0.40];

/// Base protection factor (0-255) indexed by `[rate_bucket][loss_bucket]`.
/// Rows run from the lowest per-frame bitrate (most protection needed) to
/// the highest (least); columns run from the lowest loss ratio to the
/// highest. Values are authored approximations of the shape a real
/// rate/loss table takes, not derived from first principles.
const FEC_RATE_TABLE: [[u8; 6]; 5] = [
    [20, 40, 70, 110, 160, 220],
    [15, 30, 55, 90, 130, 180],
    [10, 20, 40, 70, 100, 150],
    [5, 12, 25, 45, 70, 110],
    [0, 5, 12, 25, 45, 80],
];

fn rate_bucket(bits_per_frame: f32) -> usize {
    RATE_BUCKET_CEILINGS
        .iter()
        .position(|&ceiling| bits_per_frame <= ceiling)
        .unwrap_or(RATE_BUCKET_CEILINGS.len())
}

fn loss_bucket(loss_ratio: f32) -> usize {
    LOSS_BUCKET_CEILINGS
        .iter()
        .position(|&ceiling| loss_ratio < ceiling)
        .unwrap_or(LOSS_BUCKET_CEILINGS.len())
}

/// Looks up the base protection factor for the given per-frame bitrate and
/// loss ratio in the quantized `(rate_bucket, loss_bucket)` table.
fn lookup_protection_factor(bits_per_frame: f32, loss_ratio: f32) -> u8 {
    FEC_RATE_TABLE[rate_bucket(bits_per_frame)][loss_bucket(loss_ratio)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_fec_below_loss_floor() {
        let mut calc = ProtectionCalculator::new();
        calc.update_network_stats(NetworkStats {
            rtt: Duration::from_millis(40),
            loss_ratio: 0.001,
            available_bitrate_bps: 5_000_000,
            frame_rate: 30.0,
        });
        calc.update_codec_params(CodecParams {
            width: 1280,
            height: 720,
        });
        assert_eq!(calc.protection_params(), ProtectionParams::default());
    }

    #[test]
    fn skips_fec_above_rtt_ceiling() {
        let mut calc = ProtectionCalculator::new();
        calc.update_network_stats(NetworkStats {
            rtt: Duration::from_millis(250),
            loss_ratio: 0.05,
            available_bitrate_bps: 5_000_000,
            frame_rate: 30.0,
        });
        assert_eq!(calc.protection_params(), ProtectionParams::default());
    }

    #[test]
    fn skips_fec_below_resolution_bitrate_floor() {
        let mut calc = ProtectionCalculator::new();
        calc.update_network_stats(NetworkStats {
            rtt: Duration::from_millis(40),
            loss_ratio: 0.05,
            available_bitrate_bps: 10_000,
            frame_rate: 30.0,
        });
        calc.update_codec_params(CodecParams {
            width: 1280,
            height: 720,
        });
        assert_eq!(calc.protection_params(), ProtectionParams::default());
    }

    #[test]
    fn moderate_loss_yields_nonzero_factor_and_one_fec_packet() {
        let mut calc = ProtectionCalculator::new();
        calc.update_network_stats(NetworkStats {
            rtt: Duration::from_millis(40),
            loss_ratio: 0.05,
            available_bitrate_bps: 5_000_000,
            frame_rate: 30.0,
        });
        calc.update_codec_params(CodecParams {
            width: 1280,
            height: 720,
        });
        let params = calc.protection_params();
        assert!(params.protection_factor_delta > 0);

        let count = ProtectionCalculator::fec_count(params.protection_factor_delta, 5);
        assert_eq!(count, 1);
    }

    #[test]
    fn key_frame_factor_is_boosted_over_delta() {
        let mut calc = ProtectionCalculator::new();
        calc.update_network_stats(NetworkStats {
            rtt: Duration::from_millis(40),
            loss_ratio: 0.08,
            available_bitrate_bps: 3_000_000,
            frame_rate: 30.0,
        });
        let params = calc.protection_params();
        assert!(params.protection_factor_key >= params.protection_factor_delta);
    }

    #[test]
    fn lookup_is_table_quantized_not_continuous() {
        // Two loss ratios landing in the same bucket resolve to the exact
        // same factor; a real continuous formula would not tie like this.
        assert_eq!(lookup_protection_factor(166_667.0, 0.06), lookup_protection_factor(166_667.0, 0.09));
        assert_eq!(lookup_protection_factor(166_667.0, 0.05), 40);
    }

    #[test]
    fn fec_count_never_exceeds_half_the_group() {
        assert_eq!(ProtectionCalculator::fec_count(255, 4), 2);
        assert_eq!(ProtectionCalculator::fec_count(255, 5), 2);
    }

    #[test]
    fn zero_protection_factor_emits_nothing() {
        assert_eq!(ProtectionCalculator::fec_count(0, 10), 0);
    }
}
