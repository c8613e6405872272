use super::VideoTimingEstimator;

/// Marks the absence of an RTT sample.
const NO_SAMPLE: i64 = -1;

/// Weight of the smoothed history against a new sample, as `HISTORY_WEIGHT / (HISTORY_WEIGHT + 1)`.
const HISTORY_WEIGHT: i64 = 3;

/// Assumes a symmetric path: the one-way delay is half of the smoothed RTT.
///
/// The RTT is smoothed with a single-pole moving average that gives each new sample a weight
/// of 0.25. Both constants are part of the observable behavior other peers calibrate against,
/// alternatives belong in a separately named estimator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultVideoTimingEstimator {
    rtt: i64,
}

impl DefaultVideoTimingEstimator {
    pub fn new() -> DefaultVideoTimingEstimator {
        DefaultVideoTimingEstimator { rtt: NO_SAMPLE }
    }

    /// The current smoothed RTT, `None` until the first sample arrives.
    pub fn smoothed_rtt(&self) -> Option<i64> {
        if self.rtt == NO_SAMPLE {
            None
        } else {
            Some(self.rtt)
        }
    }
}

impl Default for DefaultVideoTimingEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoTimingEstimator for DefaultVideoTimingEstimator {
    fn reset(&mut self) {
        self.rtt = NO_SAMPLE;
    }

    fn on_rtt(&mut self, rtt: i64) {
        if self.rtt == NO_SAMPLE {
            self.rtt = rtt;
            return;
        }

        // Division truncates toward zero
        self.rtt = self
            .rtt
            .wrapping_mul(HISTORY_WEIGHT)
            .wrapping_add(rtt)
            / (HISTORY_WEIGHT + 1);
    }

    fn on_packet_received(&mut self, _send_timestamp: i64, _receive_timestamp: i64) {}

    fn on_video_timing(&mut self, _send_timestamp: i64, receive_timestamp: i64) -> Option<i64> {
        if self.rtt == NO_SAMPLE {
            return None;
        }

        Some(receive_timestamp.wrapping_sub(self.rtt / 2))
    }
}
