//! Round-trip time samples from RTCP reception reports, in milliseconds.
//!
//! https://datatracker.ietf.org/doc/html/rfc3550#section-6.4.1

use crate::estimator::VideoTimingEstimator;
use std::time::SystemTime;
use webrtc::{
    rtcp::{receiver_report::ReceiverReport, reception_report::ReceptionReport},
    rtp::extension::abs_send_time_extension::unix2ntp,
};

/// The middle 32 bits of the NTP timestamp, in 16.16 fixed point seconds.
pub fn compact_ntp(now: SystemTime) -> u32 {
    (unix2ntp(now) >> 16) as u32
}

/// RTT carried by `report`, given the compact NTP time it arrived at.
///
/// `None` if the peer has not received a sender report yet or if the clocks produce a negative
/// round trip.
pub fn rtt_ms(now: u32, report: &ReceptionReport) -> Option<i64> {
    if report.last_sender_report == 0 {
        return None;
    }

    let rtt = now
        .wrapping_sub(report.delay)
        .wrapping_sub(report.last_sender_report);
    if rtt > i32::MAX as u32 {
        return None;
    }

    Some(((rtt as i64) * 1000) >> 16)
}

/// Feeds every reception report about `ssrc` into `estimator`, returning how many were used.
pub fn feed_receiver_report<E>(
    estimator: &mut E,
    rr: &ReceiverReport,
    ssrc: u32,
    now: SystemTime,
) -> usize
where
    E: VideoTimingEstimator + ?Sized,
{
    let now = compact_ntp(now);
    let mut fed = 0;

    for report in rr.reports.iter().filter(|report| report.ssrc == ssrc) {
        if let Some(rtt) = rtt_ms(now, report) {
            estimator.on_rtt(rtt);
            fed += 1;
        }
    }
    fed
}
