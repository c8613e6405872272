//! Video timing estimator that models the clock offset from packet arrivals.
//!
//! Build it and point the host at the resulting library:
//!
//! ```text
//! cargo build --release
//! VIDEO_TIMING_ESTIMATOR_MODULE=target/release/libmin_delay_estimator.so <host>
//! ```

use webrtc_video_timing::{DefaultVideoTimingEstimator, VideoTimingEstimator};

/// Takes the smallest `receive - send` delta seen as the clock offset plus the one-way delay,
/// then removes half of the smoothed RTT. Until a packet has been observed it behaves like the
/// default estimator.
#[derive(Debug, Default)]
pub struct MinDelayEstimator {
    rtt: DefaultVideoTimingEstimator,
    min_delta: Option<i64>,
}

impl VideoTimingEstimator for MinDelayEstimator {
    fn reset(&mut self) {
        self.rtt.reset();
        self.min_delta = None;
    }

    fn on_rtt(&mut self, rtt: i64) {
        self.rtt.on_rtt(rtt);
    }

    fn on_packet_received(&mut self, send_timestamp: i64, receive_timestamp: i64) {
        let delta = receive_timestamp.wrapping_sub(send_timestamp);
        self.min_delta = Some(self.min_delta.map_or(delta, |min| min.min(delta)));
    }

    fn on_video_timing(&mut self, send_timestamp: i64, receive_timestamp: i64) -> Option<i64> {
        let Some(min_delta) = self.min_delta else {
            return self.rtt.on_video_timing(send_timestamp, receive_timestamp);
        };
        let rtt = self.rtt.smoothed_rtt()?;

        Some(send_timestamp.wrapping_add(min_delta).wrapping_sub(rtt / 2))
    }
}

webrtc_video_timing::export_video_timing_estimator!(MinDelayEstimator);
