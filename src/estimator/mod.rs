mod default;

pub use self::default::DefaultVideoTimingEstimator;

/// Translates sender-side video timing into the receiver's clock domain.
///
/// One instance tracks one stream. All timestamps and RTT values share the caller's clock unit.
/// Implementations are driven from a single owner and are not expected to synchronize
/// internally.
pub trait VideoTimingEstimator {
    /// Forgets every RTT sample seen so far.
    fn reset(&mut self);

    /// Feeds one round-trip time measurement.
    fn on_rtt(&mut self, rtt: i64);

    /// Observes the raw arrival of a packet. Must never block.
    fn on_packet_received(&mut self, send_timestamp: i64, receive_timestamp: i64);

    /// Returns what the local clock read when the peer sent the packet, or `None` if the
    /// estimator has not seen enough data yet.
    fn on_video_timing(&mut self, send_timestamp: i64, receive_timestamp: i64) -> Option<i64>;
}

impl<T> VideoTimingEstimator for Box<T>
where
    T: VideoTimingEstimator + ?Sized,
{
    fn reset(&mut self) {
        (**self).reset()
    }

    fn on_rtt(&mut self, rtt: i64) {
        (**self).on_rtt(rtt)
    }

    fn on_packet_received(&mut self, send_timestamp: i64, receive_timestamp: i64) {
        (**self).on_packet_received(send_timestamp, receive_timestamp)
    }

    fn on_video_timing(&mut self, send_timestamp: i64, receive_timestamp: i64) -> Option<i64> {
        (**self).on_video_timing(send_timestamp, receive_timestamp)
    }
}
