//! Latest-value hand-off from the scan task to its consumers.
//!
//! One slot. Publishing never blocks and overwrites whatever has not been
//! drained yet; a consumer that falls behind only ever sees the newest
//! sample. Draining takes the sample out, so each published sample reaches
//! at most one consumer.
//!
//! The slot has a single waker: at most one task may wait in
//! [`SampleQueue::drain_within`] or [`SampleQueue::drain_latest`] at a time.
//! Other readers should poll with [`SampleQueue::try_drain`] or take a
//! state snapshot instead.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

use crate::error::{Error, Result};
use crate::state::RadarSample;

pub struct SampleQueue<M: RawMutex> {
    slot: Signal<M, RadarSample>,
}

impl<M: RawMutex> SampleQueue<M> {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }

    /// Replace the pending sample, if any.
    pub fn publish(&self, sample: RadarSample) {
        self.slot.signal(sample);
    }

    /// Take the pending sample without waiting.
    pub fn try_drain(&self) -> Option<RadarSample> {
        self.slot.try_take()
    }

    /// Whether a sample is waiting to be drained.
    pub fn has_pending(&self) -> bool {
        self.slot.signaled()
    }

    /// Wait up to `timeout` for a sample.
    pub async fn drain_within(&self, timeout: Duration) -> Result<RadarSample> {
        with_timeout(timeout, self.slot.wait())
            .await
            .map_err(|_| Error::QueueTimeout(timeout.as_millis()))
    }

    /// Take whatever is pending right now, or wait up to `timeout` for the
    /// next one. What a consumer calls before doing expensive work.
    pub async fn drain_latest(&self, timeout: Duration) -> Result<RadarSample> {
        match self.try_drain() {
            Some(sample) => Ok(sample),
            None => self.drain_within(timeout).await,
        }
    }
}

impl<M: RawMutex> Default for SampleQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmState, SystemState};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    fn sample(angle: u16, distance: f32) -> RadarSample {
        RadarSample {
            angle,
            distance,
            alarm: AlarmState::Safe,
            system: SystemState::Scanning,
        }
    }

    #[test]
    fn latest_publish_wins() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        q.publish(sample(10, 100.0));
        q.publish(sample(15, 120.0));
        assert_eq!(q.try_drain(), Some(sample(15, 120.0)));
        assert_eq!(q.try_drain(), None);
    }

    #[test]
    fn drain_empties_slot() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        assert!(!q.has_pending());
        q.publish(sample(0, 50.0));
        assert!(q.has_pending());
        q.try_drain();
        assert!(!q.has_pending());
    }

    #[test]
    fn drain_within_returns_published() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        q.publish(sample(90, 33.0));
        let got = block_on(q.drain_within(Duration::from_millis(100)));
        assert_eq!(got, Ok(sample(90, 33.0)));
    }

    #[test]
    fn drain_within_times_out_when_empty() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        let got = block_on(q.drain_within(Duration::from_millis(20)));
        assert_eq!(got, Err(Error::QueueTimeout(20)));
    }

    #[test]
    fn drain_latest_prefers_pending() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        q.publish(sample(45, 60.0));
        let got = block_on(q.drain_latest(Duration::from_millis(20)));
        assert_eq!(got, Ok(sample(45, 60.0)));
    }

    #[test]
    fn keeping_up_sees_every_sample_in_order() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        let mut seen = Vec::new();
        for angle in (0..=30).step_by(5) {
            q.publish(sample(angle, 80.0));
            seen.push(q.try_drain().map(|s| s.angle));
        }
        let expected: Vec<Option<u16>> = (0..=30).step_by(5).map(Some).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn publish_from_other_thread_wakes_consumer() {
        static Q: SampleQueue<CriticalSectionRawMutex> = SampleQueue::new();
        let producer = std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(10));
            Q.publish(sample(120, 25.0));
        });
        let got = block_on(Q.drain_within(Duration::from_millis(1000)));
        producer.join().unwrap();
        assert_eq!(got.map(|s| s.angle), Ok(120));
    }
}
