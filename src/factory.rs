use crate::{
    abi::{DestroyEstimatorFn, RawVideoTimingEstimator, VIDEO_TIMING_ABI_VERSION},
    estimator::{DefaultVideoTimingEstimator, VideoTimingEstimator},
    extension::{self, ExtensionEntryPoints},
};
use std::{fmt, ptr::NonNull};

/// Which implementation backs an [`EstimatorHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorOrigin {
    Default,
    Extension,
}

enum Backing {
    Default(DefaultVideoTimingEstimator),
    Extension {
        raw: NonNull<RawVideoTimingEstimator>,
        destroy: DestroyEstimatorFn,
    },
}

/// Owns one estimator instance and releases it with the function matching its origin.
pub struct EstimatorHandle {
    backing: Backing,
}

// Extensions must produce instances that can move between threads. The handle is still
// single-owner, so it is deliberately not `Sync`.
unsafe impl Send for EstimatorHandle {}

impl EstimatorHandle {
    /// Creates an estimator, preferring the process-wide extension when one was discovered.
    ///
    /// Never fails: every problem with the extension degrades to the default estimator.
    pub fn create() -> EstimatorHandle {
        match extension::extension() {
            // A loaded module is trusted to honor the extension ABI
            Some(module) => unsafe { Self::from_entry_points(module.entry_points()) },
            None => Self::new_default(),
        }
    }

    pub fn new_default() -> EstimatorHandle {
        EstimatorHandle {
            backing: Backing::Default(DefaultVideoTimingEstimator::new()),
        }
    }

    /// Creates an instance through `entry_points`, falling back to the default estimator for
    /// this call only if the extension does not produce a usable instance.
    ///
    /// # Safety
    ///
    /// `create` must return null or a table built by [`abi::into_raw`](crate::abi::into_raw)
    /// (or an equivalent layout for the same ABI version) whose instance is `Send`, and
    /// `destroy` must be the function releasing exactly the tables `create` produces.
    pub unsafe fn from_entry_points(entry_points: ExtensionEntryPoints) -> EstimatorHandle {
        let Some(raw) = NonNull::new(unsafe { (entry_points.create)() }) else {
            log::warn!(
                "Error creating video timing estimator from an external module, \
                 switching to the default implementation"
            );
            return Self::new_default();
        };

        let abi_version = unsafe { raw.as_ref().abi_version };
        if abi_version != VIDEO_TIMING_ABI_VERSION {
            log::warn!(
                "External video timing estimator has ABI v{abi_version}, expected \
                 v{VIDEO_TIMING_ABI_VERSION}, switching to the default implementation"
            );
            unsafe { (entry_points.destroy)(raw.as_ptr()) };
            return Self::new_default();
        }

        EstimatorHandle {
            backing: Backing::Extension {
                raw,
                destroy: entry_points.destroy,
            },
        }
    }

    pub fn origin(&self) -> EstimatorOrigin {
        match self.backing {
            Backing::Default(_) => EstimatorOrigin::Default,
            Backing::Extension { .. } => EstimatorOrigin::Extension,
        }
    }
}

impl VideoTimingEstimator for EstimatorHandle {
    fn reset(&mut self) {
        match &mut self.backing {
            Backing::Default(estimator) => estimator.reset(),
            Backing::Extension { raw, .. } => {
                let table = unsafe { raw.as_ref() };
                unsafe { (table.reset)(table.instance) }
            }
        }
    }

    fn on_rtt(&mut self, rtt: i64) {
        match &mut self.backing {
            Backing::Default(estimator) => estimator.on_rtt(rtt),
            Backing::Extension { raw, .. } => {
                let table = unsafe { raw.as_ref() };
                unsafe { (table.on_rtt)(table.instance, rtt) }
            }
        }
    }

    fn on_packet_received(&mut self, send_timestamp: i64, receive_timestamp: i64) {
        match &mut self.backing {
            Backing::Default(estimator) => {
                estimator.on_packet_received(send_timestamp, receive_timestamp)
            }
            Backing::Extension { raw, .. } => {
                let table = unsafe { raw.as_ref() };
                unsafe {
                    (table.on_packet_received)(table.instance, send_timestamp, receive_timestamp)
                }
            }
        }
    }

    fn on_video_timing(&mut self, send_timestamp: i64, receive_timestamp: i64) -> Option<i64> {
        match &mut self.backing {
            Backing::Default(estimator) => {
                estimator.on_video_timing(send_timestamp, receive_timestamp)
            }
            Backing::Extension { raw, .. } => {
                let table = unsafe { raw.as_ref() };
                let mut recv_clock_sync_send_timestamp = 0;
                let ok = unsafe {
                    (table.on_video_timing)(
                        table.instance,
                        send_timestamp,
                        receive_timestamp,
                        &mut recv_clock_sync_send_timestamp,
                    )
                };
                ok.then_some(recv_clock_sync_send_timestamp)
            }
        }
    }
}

impl Drop for EstimatorHandle {
    fn drop(&mut self) {
        if let Backing::Extension { raw, destroy } = self.backing {
            unsafe { destroy(raw.as_ptr()) }
        }
    }
}

impl fmt::Debug for EstimatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backing {
            Backing::Default(estimator) => f
                .debug_tuple("EstimatorHandle::Default")
                .field(estimator)
                .finish(),
            Backing::Extension { raw, .. } => f
                .debug_tuple("EstimatorHandle::Extension")
                .field(raw)
                .finish(),
        }
    }
}

/// Shorthand for [`EstimatorHandle::create`].
pub fn create_estimator() -> EstimatorHandle {
    EstimatorHandle::create()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abi::{self, CreateEstimatorFn},
        config::MODULE_PATH_ENV,
    };
    use std::{
        ptr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Reports a fixed clock offset so results are distinguishable from the default.
    #[derive(Default)]
    struct FixedOffset {
        packets: i64,
    }

    impl VideoTimingEstimator for FixedOffset {
        fn reset(&mut self) {
            self.packets = 0;
        }

        fn on_rtt(&mut self, _rtt: i64) {}

        fn on_packet_received(&mut self, _send_timestamp: i64, _receive_timestamp: i64) {
            self.packets += 1;
        }

        fn on_video_timing(&mut self, send_timestamp: i64, _receive_timestamp: i64) -> Option<i64> {
            (self.packets > 0).then_some(send_timestamp + 1_000_000 + self.packets)
        }
    }

    crate::export_video_timing_estimator!(FixedOffset);

    fn exported() -> ExtensionEntryPoints {
        ExtensionEntryPoints {
            create: CreateVideoTimingEstimator,
            destroy: DestroyVideoTimingEstimator,
        }
    }

    static CREATED: AtomicUsize = AtomicUsize::new(0);
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn counting_create() -> *mut RawVideoTimingEstimator {
        CREATED.fetch_add(1, Ordering::SeqCst);
        abi::into_raw(DefaultVideoTimingEstimator::new())
    }

    unsafe extern "C" fn counting_destroy(raw: *mut RawVideoTimingEstimator) {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
        unsafe { abi::destroy_raw::<DefaultVideoTimingEstimator>(raw) }
    }

    static NULL_DESTROYED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn null_create() -> *mut RawVideoTimingEstimator {
        ptr::null_mut()
    }

    unsafe extern "C" fn null_destroy(_raw: *mut RawVideoTimingEstimator) {
        NULL_DESTROYED.fetch_add(1, Ordering::SeqCst);
    }

    static STALE_DESTROYED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn stale_create() -> *mut RawVideoTimingEstimator {
        let raw = abi::into_raw(DefaultVideoTimingEstimator::new());
        unsafe { (*raw).abi_version = VIDEO_TIMING_ABI_VERSION + 1 };
        raw
    }

    unsafe extern "C" fn stale_destroy(raw: *mut RawVideoTimingEstimator) {
        STALE_DESTROYED.fetch_add(1, Ordering::SeqCst);
        unsafe { abi::destroy_raw::<DefaultVideoTimingEstimator>(raw) }
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn default_handle_matches_default_arithmetic() {
        let mut handle = EstimatorHandle::new_default();
        assert_eq!(handle.origin(), EstimatorOrigin::Default);
        assert_eq!(handle.on_video_timing(0, 1000), None);
        handle.on_rtt(100);
        assert_eq!(handle.on_video_timing(0, 1000), Some(950));
        handle.on_rtt(300);
        assert_eq!(handle.on_video_timing(0, 1000), Some(925));
        handle.on_packet_received(0, 1);
        assert_eq!(handle.on_video_timing(0, 1000), Some(925));
        handle.reset();
        assert_eq!(handle.on_video_timing(0, 1000), None);
    }

    #[test]
    fn exported_estimator_backs_handle() {
        init_logger();
        let mut handle = unsafe { EstimatorHandle::from_entry_points(exported()) };
        assert_eq!(handle.origin(), EstimatorOrigin::Extension);

        handle.on_rtt(100);
        assert_eq!(handle.on_video_timing(5, 1000), None);
        handle.on_packet_received(0, 10);
        handle.on_packet_received(1, 11);
        assert_eq!(handle.on_video_timing(5, 1000), Some(1_000_007));
        handle.reset();
        assert_eq!(handle.on_video_timing(5, 1000), None);
    }

    #[test]
    fn extension_instance_is_destroyed_exactly_once() {
        init_logger();
        let entry_points = ExtensionEntryPoints {
            create: counting_create,
            destroy: counting_destroy,
        };

        {
            let mut handle = unsafe { EstimatorHandle::from_entry_points(entry_points) };
            assert_eq!(handle.origin(), EstimatorOrigin::Extension);
            handle.on_rtt(100);
            assert_eq!(handle.on_video_timing(0, 1000), Some(950));
            assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);
        }
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_instance_falls_back_for_this_call() {
        init_logger();
        let entry_points = ExtensionEntryPoints {
            create: null_create,
            destroy: null_destroy,
        };

        for _ in 0..2 {
            let mut handle = unsafe { EstimatorHandle::from_entry_points(entry_points) };
            assert_eq!(handle.origin(), EstimatorOrigin::Default);
            handle.on_rtt(100);
            assert_eq!(handle.on_video_timing(0, 1000), Some(950));
        }
        assert_eq!(NULL_DESTROYED.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_abi_version_is_released_and_replaced() {
        init_logger();
        let entry_points = ExtensionEntryPoints {
            create: stale_create,
            destroy: stale_destroy,
        };

        let handle = unsafe { EstimatorHandle::from_entry_points(entry_points) };
        assert_eq!(handle.origin(), EstimatorOrigin::Default);
        assert_eq!(STALE_DESTROYED.load(Ordering::SeqCst), 1);
        drop(handle);
        assert_eq!(STALE_DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handles_are_independent() {
        let create: CreateEstimatorFn = CreateVideoTimingEstimator;
        let mut a = EstimatorHandle::new_default();
        let mut b = unsafe {
            EstimatorHandle::from_entry_points(ExtensionEntryPoints {
                create,
                destroy: DestroyVideoTimingEstimator,
            })
        };

        a.on_rtt(100);
        assert_eq!(a.on_video_timing(0, 1000), Some(950));
        assert_eq!(b.on_video_timing(0, 1000), None);
        b.on_packet_received(0, 0);
        a.reset();
        assert_eq!(a.on_video_timing(0, 1000), None);
        assert_eq!(b.on_video_timing(0, 1000), Some(1_000_001));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_agrees_on_discovery() {
        init_logger();
        let configured = std::env::var_os(MODULE_PATH_ENV).is_some_and(|v| !v.is_empty());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                tokio::task::spawn_blocking(move || {
                    let mut handle = create_estimator();
                    let loaded = extension::is_loaded();
                    if handle.origin() == EstimatorOrigin::Default {
                        handle.on_rtt(100 + i);
                        assert_eq!(handle.on_video_timing(0, 1000), Some(1000 - (100 + i) / 2));
                    }
                    (handle.origin(), loaded)
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        let loaded = outcomes[0].1;
        assert!(outcomes.iter().all(|(_, l)| *l == loaded));
        if !configured {
            assert!(!loaded);
            assert!(outcomes
                .iter()
                .all(|(origin, _)| *origin == EstimatorOrigin::Default));
        }
    }
}
