//! Delay-based bandwidth estimation: groups sent packets into bursts, tracks
//! the trend of one-way delay between consecutive bursts with an adaptive
//! filter, and drives a hold/increase/decrease state machine off it.

use super::acknowledgment::Acknowledgment;
use std::time::{Duration, Instant};

/// Network usage as classified from the smoothed delay trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Normal,
    Overuse,
    Underuse,
}

/// Controller state driving the rate adaptation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Hold,
    Increase,
    Decrease,
}

/// Snapshot of the delay controller's view of the network, returned from
/// each call to [`DelayController::update`].
#[derive(Debug, Clone, Copy)]
pub struct DelayStats {
    pub target_bitrate: i64,
    pub measurement_ms: f64,
    pub estimate_ms: f64,
    pub threshold_ms: f64,
    pub usage: Usage,
    pub state: ControllerState,
}

/// Maximum gap between two packets' departures before they are considered
/// part of separate send bursts.
const BURST_WINDOW: Duration = Duration::from_millis(5);

const THRESHOLD_MIN_MS: f64 = 6.0;
const THRESHOLD_MAX_MS: f64 = 600.0;
const K_UP: f64 = 0.01;
const K_DOWN: f64 = 0.000_18;
const TREND_SMOOTHING: f64 = 0.95;
const ADDITIVE_STEP_BPS: f64 = 1_000.0;
const MULTIPLICATIVE_INCREASE: f64 = 1.08;
const DECREASE_FACTOR: f64 = 0.85;
const NEAR_MAX_RATIO: f64 = 0.95;

struct Burst {
    last_departure: Instant,
    last_arrival: Instant,
    total_size: usize,
}

pub struct DelayController {
    min_bitrate: i64,
    max_bitrate: i64,
    rate: f64,
    state: ControllerState,
    estimate_ms: f64,
    threshold_ms: f64,
    last_threshold_update: Option<Instant>,
    avg_max_bitrate: Option<f64>,
    rtt: Duration,
}

impl DelayController {
    pub fn new(initial_bitrate: i64, min_bitrate: i64, max_bitrate: i64) -> Self {
        Self {
            min_bitrate,
            max_bitrate,
            rate: initial_bitrate as f64,
            state: ControllerState::Hold,
            estimate_ms: 0.0,
            threshold_ms: 12.5,
            last_threshold_update: None,
            avg_max_bitrate: None,
            rtt: Duration::from_millis(100),
        }
    }

    pub fn update_rtt(&mut self, rtt: Duration) {
        self.rtt = rtt;
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    /// Group `acks` into send bursts and feed every adjacent pair of bursts
    /// through the trend filter, updating state and rate along the way.
    pub fn update(&mut self, now: Instant, acks: &[Acknowledgment]) -> DelayStats {
        let groups = group_into_bursts(acks);
        if groups.len() < 2 {
            self.last_threshold_update.get_or_insert(now);
        }

        let mut last_measurement_ms = 0.0;
        for pair in groups.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let delay_delta_ms = (curr.last_arrival.duration_since(prev.last_arrival).as_secs_f64()
                - curr
                    .last_departure
                    .duration_since(prev.last_departure)
                    .as_secs_f64())
                * 1000.0;

            last_measurement_ms = delay_delta_ms;
            self.estimate_ms = TREND_SMOOTHING * self.estimate_ms + (1.0 - TREND_SMOOTHING) * delay_delta_ms;

            self.adapt_threshold(curr.last_arrival);
            let usage = self.classify_usage();
            self.state = next_state(self.state, usage);
            self.update_rate(curr, usage);
        }

        DelayStats {
            target_bitrate: self.rate as i64,
            measurement_ms: last_measurement_ms,
            estimate_ms: self.estimate_ms,
            threshold_ms: self.threshold_ms,
            usage: self.classify_usage(),
            state: self.state,
        }
    }

    fn classify_usage(&self) -> Usage {
        if self.estimate_ms > self.threshold_ms {
            Usage::Overuse
        } else if self.estimate_ms < -self.threshold_ms {
            Usage::Underuse
        } else {
            Usage::Normal
        }
    }

    fn adapt_threshold(&mut self, now: Instant) {
        let elapsed_ms = self
            .last_threshold_update
            .map(|t| now.duration_since(t).as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
            .min(100.0);
        self.last_threshold_update = Some(now);

        let k = if self.estimate_ms.abs() > self.threshold_ms {
            K_UP
        } else {
            K_DOWN
        };
        self.threshold_ms += k * (self.estimate_ms.abs() - self.threshold_ms) * elapsed_ms;
        self.threshold_ms = self.threshold_ms.clamp(THRESHOLD_MIN_MS, THRESHOLD_MAX_MS);
    }

    fn update_rate(&mut self, group: &Burst, usage: Usage) {
        match self.state {
            ControllerState::Hold => {}
            ControllerState::Increase => {
                let near_max = self
                    .avg_max_bitrate
                    .is_some_and(|m| self.rate > NEAR_MAX_RATIO * m);
                if near_max {
                    self.rate += ADDITIVE_STEP_BPS;
                } else {
                    self.rate *= MULTIPLICATIVE_INCREASE;
                }
            }
            ControllerState::Decrease => {
                let incoming_rate = group.total_size as f64 * 8.0 / BURST_WINDOW.as_secs_f64().max(0.001);
                let decreased = DECREASE_FACTOR * incoming_rate.max(self.rate);
                self.rate = self.rate.min(decreased);
                self.avg_max_bitrate = Some(self.rate);
            }
        }
        let _ = usage;
        self.rate = self.rate.clamp(self.min_bitrate as f64, self.max_bitrate as f64);
    }
}

fn next_state(state: ControllerState, usage: Usage) -> ControllerState {
    match (state, usage) {
        (_, Usage::Underuse) => ControllerState::Hold,
        (ControllerState::Hold, Usage::Normal) => ControllerState::Increase,
        (ControllerState::Hold, Usage::Overuse) => ControllerState::Decrease,
        (ControllerState::Increase, Usage::Normal) => ControllerState::Increase,
        (ControllerState::Increase, Usage::Overuse) => ControllerState::Decrease,
        (ControllerState::Decrease, Usage::Normal) => ControllerState::Hold,
        (ControllerState::Decrease, Usage::Overuse) => ControllerState::Decrease,
    }
}

fn group_into_bursts(acks: &[Acknowledgment]) -> Vec<Burst> {
    let mut received: Vec<&Acknowledgment> = acks.iter().filter(|a| a.arrival.is_some()).collect();
    received.sort_by_key(|a| a.departure);

    let mut groups: Vec<Burst> = Vec::new();
    for ack in received {
        let arrival = ack.arrival.expect("filtered to received acks");
        match groups.last_mut() {
            Some(group) if ack.departure.duration_since(group.last_departure) <= BURST_WINDOW => {
                group.last_departure = ack.departure;
                group.last_arrival = arrival;
                group.total_size += ack.size;
            }
            _ => groups.push(Burst {
                last_departure: ack.departure,
                last_arrival: arrival,
                total_size: ack.size,
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(seq: u16, departure: Instant, arrival: Instant, size: usize) -> Acknowledgment {
        Acknowledgment {
            ssrc: 1,
            sequence_number: seq,
            size,
            departure,
            arrival: Some(arrival),
            ecn: 0,
        }
    }

    #[test]
    fn steady_state_holds_or_increases() {
        let mut controller = DelayController::new(1_000_000, 50_000, 50_000_000);
        let base = Instant::now();

        let mut acks = Vec::new();
        for i in 0..50u64 {
            let t = base + Duration::from_millis(i * 20);
            acks.push(ack(i as u16, t, t + Duration::from_millis(10), 1200));
        }

        let stats = controller.update(base + Duration::from_secs(2), &acks);
        assert_ne!(stats.state, ControllerState::Decrease);
    }

    #[test]
    fn growing_one_way_delay_triggers_overuse() {
        let mut controller = DelayController::new(5_000_000, 50_000, 50_000_000);
        let base = Instant::now();

        let mut acks = Vec::new();
        for i in 0..30u64 {
            let departure = base + Duration::from_millis(i * 20);
            let arrival = departure + Duration::from_millis(10 + i * 40);
            acks.push(ack(i as u16, departure, arrival, 1200));
        }

        let stats = controller.update(base + Duration::from_secs(1), &acks);
        assert_eq!(stats.usage, Usage::Overuse);
        assert_eq!(stats.state, ControllerState::Decrease);
        assert!(stats.target_bitrate < 5_000_000);
    }

    #[test]
    fn empty_acks_leave_state_unchanged() {
        let mut controller = DelayController::new(1_000_000, 50_000, 50_000_000);
        let stats = controller.update(Instant::now(), &[]);
        assert_eq!(stats.state, ControllerState::Hold);
    }
}
