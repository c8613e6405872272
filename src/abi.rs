//! C-compatible boundary between the host and a dynamically loaded estimator.
//!
//! An extension library exports two symbols:
//!
//! ```text
//! CreateVideoTimingEstimator() -> *mut RawVideoTimingEstimator
//! DestroyVideoTimingEstimator(*mut RawVideoTimingEstimator)
//! ```
//!
//! Use [`export_video_timing_estimator!`](crate::export_video_timing_estimator) to generate
//! both from any type implementing [`VideoTimingEstimator`] and [`Default`].
//!
//! ```toml
//! [lib]
//! crate-type = ["cdylib"]
//! ```

use crate::estimator::VideoTimingEstimator;
use std::{
    ffi::c_void,
    panic::{catch_unwind, AssertUnwindSafe},
    ptr,
};

/// Bumped on any layout change of [`RawVideoTimingEstimator`].
pub const VIDEO_TIMING_ABI_VERSION: u32 = 1;

pub const CREATE_SYMBOL: &str = "CreateVideoTimingEstimator";

pub const DESTROY_SYMBOL: &str = "DestroyVideoTimingEstimator";

pub type CreateEstimatorFn = unsafe extern "C" fn() -> *mut RawVideoTimingEstimator;

pub type DestroyEstimatorFn = unsafe extern "C" fn(*mut RawVideoTimingEstimator);

/// An estimator instance together with the functions operating on it.
///
/// `abi_version` must stay the first field so that a host can reject tables it does not
/// understand.
#[repr(C)]
pub struct RawVideoTimingEstimator {
    pub abi_version: u32,
    pub instance: *mut c_void,
    pub reset: unsafe extern "C" fn(instance: *mut c_void),
    pub on_rtt: unsafe extern "C" fn(instance: *mut c_void, rtt: i64),
    pub on_packet_received:
        unsafe extern "C" fn(instance: *mut c_void, send_timestamp: i64, receive_timestamp: i64),
    pub on_video_timing: unsafe extern "C" fn(
        instance: *mut c_void,
        send_timestamp: i64,
        receive_timestamp: i64,
        recv_clock_sync_send_timestamp: *mut i64,
    ) -> bool,
}

/// Moves `estimator` to the heap behind a [`RawVideoTimingEstimator`].
///
/// The result must be released with [`destroy_raw`] instantiated with the same `T`. Hosts may
/// drive the instance from any thread, hence `T: Send`.
///
/// ```compile_fail
/// use std::{cell::Cell, rc::Rc};
/// use webrtc_video_timing::VideoTimingEstimator;
///
/// #[derive(Default)]
/// struct Shared(Rc<Cell<i64>>);
///
/// impl VideoTimingEstimator for Shared {
///     fn reset(&mut self) {}
///     fn on_rtt(&mut self, rtt: i64) {
///         self.0.set(rtt);
///     }
///     fn on_packet_received(&mut self, _send_timestamp: i64, _receive_timestamp: i64) {}
///     fn on_video_timing(&mut self, _send_timestamp: i64, receive_timestamp: i64) -> Option<i64> {
///         Some(receive_timestamp - self.0.get() / 2)
///     }
/// }
///
/// webrtc_video_timing::export_video_timing_estimator!(Shared);
/// ```
pub fn into_raw<T>(estimator: T) -> *mut RawVideoTimingEstimator
where
    T: VideoTimingEstimator + Send + 'static,
{
    let instance = Box::into_raw(Box::new(estimator)).cast::<c_void>();
    Box::into_raw(Box::new(RawVideoTimingEstimator {
        abi_version: VIDEO_TIMING_ABI_VERSION,
        instance,
        reset: reset_shim::<T>,
        on_rtt: on_rtt_shim::<T>,
        on_packet_received: on_packet_received_shim::<T>,
        on_video_timing: on_video_timing_shim::<T>,
    }))
}

/// Creates a default `T` for export, returning null if construction panics.
pub fn create_raw<T>() -> *mut RawVideoTimingEstimator
where
    T: VideoTimingEstimator + Default + Send + 'static,
{
    guard("create", ptr::null_mut(), || into_raw(T::default()))
}

/// Releases a table created by [`into_raw`]. Null is ignored.
///
/// # Safety
///
/// `raw` must come from `into_raw::<T>` and must not be used afterwards.
pub unsafe fn destroy_raw<T>(raw: *mut RawVideoTimingEstimator)
where
    T: VideoTimingEstimator + Send + 'static,
{
    if raw.is_null() {
        return;
    }

    let raw = unsafe { Box::from_raw(raw) };
    let instance = unsafe { Box::from_raw(raw.instance.cast::<T>()) };
    guard("destroy", (), move || drop(instance));
}

/// Panics must not unwind into the host.
fn guard<R>(operation: &'static str, fallback: R, f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        log::error!("Video timing estimator panicked during `{operation}`");
        fallback
    })
}

unsafe extern "C" fn reset_shim<T: VideoTimingEstimator>(instance: *mut c_void) {
    let estimator = unsafe { &mut *instance.cast::<T>() };
    guard("reset", (), || estimator.reset());
}

unsafe extern "C" fn on_rtt_shim<T: VideoTimingEstimator>(instance: *mut c_void, rtt: i64) {
    let estimator = unsafe { &mut *instance.cast::<T>() };
    guard("on_rtt", (), || estimator.on_rtt(rtt));
}

unsafe extern "C" fn on_packet_received_shim<T: VideoTimingEstimator>(
    instance: *mut c_void,
    send_timestamp: i64,
    receive_timestamp: i64,
) {
    let estimator = unsafe { &mut *instance.cast::<T>() };
    guard("on_packet_received", (), || {
        estimator.on_packet_received(send_timestamp, receive_timestamp)
    });
}

unsafe extern "C" fn on_video_timing_shim<T: VideoTimingEstimator>(
    instance: *mut c_void,
    send_timestamp: i64,
    receive_timestamp: i64,
    recv_clock_sync_send_timestamp: *mut i64,
) -> bool {
    let estimator = unsafe { &mut *instance.cast::<T>() };
    let timing = guard("on_video_timing", None, || {
        estimator.on_video_timing(send_timestamp, receive_timestamp)
    });

    match timing {
        Some(timestamp) if !recv_clock_sync_send_timestamp.is_null() => {
            unsafe { *recv_clock_sync_send_timestamp = timestamp };
            true
        }
        _ => false,
    }
}

/// Exports `CreateVideoTimingEstimator` and `DestroyVideoTimingEstimator` for `$estimator`.
///
/// ```ignore
/// #[derive(Default)]
/// struct MyEstimator { /* ... */ }
///
/// impl webrtc_video_timing::VideoTimingEstimator for MyEstimator { /* ... */ }
///
/// webrtc_video_timing::export_video_timing_estimator!(MyEstimator);
/// ```
#[macro_export]
macro_rules! export_video_timing_estimator {
    ($estimator:ty) => {
        #[allow(non_snake_case)]
        #[no_mangle]
        pub extern "C" fn CreateVideoTimingEstimator() -> *mut $crate::abi::RawVideoTimingEstimator
        {
            $crate::abi::create_raw::<$estimator>()
        }

        #[allow(non_snake_case)]
        #[no_mangle]
        pub unsafe extern "C" fn DestroyVideoTimingEstimator(
            estimator: *mut $crate::abi::RawVideoTimingEstimator,
        ) {
            unsafe { $crate::abi::destroy_raw::<$estimator>(estimator) }
        }
    };
}
