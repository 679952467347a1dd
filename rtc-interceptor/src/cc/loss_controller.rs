//! Loss-based bandwidth estimation: a simple AIMD controller driven by the
//! fraction of acknowledged packets reported lost.

use super::acknowledgment::Acknowledgment;

#[derive(Debug, Clone, Copy)]
pub struct LossStats {
    pub target_bitrate: i64,
    pub loss_ratio: f64,
}

const LOW_LOSS_THRESHOLD: f64 = 0.02;
const HIGH_LOSS_THRESHOLD: f64 = 0.10;
const INCREASE_FACTOR: f64 = 1.05;

pub struct LossController {
    min_bitrate: i64,
    max_bitrate: i64,
    rate: f64,
}

impl LossController {
    pub fn new(initial_bitrate: i64, min_bitrate: i64, max_bitrate: i64) -> Self {
        Self {
            min_bitrate,
            max_bitrate,
            rate: initial_bitrate as f64,
        }
    }

    pub fn update(&mut self, acks: &[Acknowledgment]) -> LossStats {
        if acks.is_empty() {
            return LossStats {
                target_bitrate: self.rate as i64,
                loss_ratio: 0.0,
            };
        }

        let lost = acks.iter().filter(|a| a.lost()).count();
        let loss_ratio = lost as f64 / acks.len() as f64;

        if loss_ratio < LOW_LOSS_THRESHOLD {
            self.rate *= INCREASE_FACTOR;
        } else if loss_ratio > HIGH_LOSS_THRESHOLD {
            self.rate *= 1.0 - 0.5 * loss_ratio;
        }
        // Between the two thresholds, hold the current rate.

        self.rate = self.rate.clamp(self.min_bitrate as f64, self.max_bitrate as f64);

        LossStats {
            target_bitrate: self.rate as i64,
            loss_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn acks(total: usize, lost: usize) -> Vec<Acknowledgment> {
        let now = Instant::now();
        (0..total)
            .map(|i| Acknowledgment {
                ssrc: 1,
                sequence_number: i as u16,
                size: 1200,
                departure: now,
                arrival: if i < lost { None } else { Some(now) },
                ecn: 0,
            })
            .collect()
    }

    #[test]
    fn low_loss_increases_rate() {
        let mut controller = LossController::new(1_000_000, 50_000, 50_000_000);
        let stats = controller.update(&acks(100, 0));
        assert!(stats.target_bitrate > 1_000_000);
    }

    #[test]
    fn moderate_loss_holds_rate() {
        let mut controller = LossController::new(1_000_000, 50_000, 50_000_000);
        let stats = controller.update(&acks(100, 5));
        assert_eq!(stats.target_bitrate, 1_000_000);
    }

    #[test]
    fn high_loss_decreases_rate() {
        let mut controller = LossController::new(1_000_000, 50_000, 50_000_000);
        let stats = controller.update(&acks(100, 20));
        assert!(stats.target_bitrate < 1_000_000);
    }

    #[test]
    fn empty_batch_leaves_rate_unchanged() {
        let mut controller = LossController::new(1_000_000, 50_000, 50_000_000);
        let stats = controller.update(&[]);
        assert_eq!(stats.target_bitrate, 1_000_000);
    }
}
