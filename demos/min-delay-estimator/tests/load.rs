mod common;

use webrtc_video_timing::{
    extension::{discover, ExtensionModule},
    EstimatorHandle, EstimatorOrigin, ExtensionConfig, VideoTimingEstimator,
};

#[test]
fn loads_built_library_and_calls_through_it() {
    let module = ExtensionModule::load(&common::built_library()).unwrap();
    let mut handle = unsafe { EstimatorHandle::from_entry_points(module.entry_points()) };
    assert_eq!(handle.origin(), EstimatorOrigin::Extension);

    assert_eq!(handle.on_video_timing(300, 5_400), None);
    handle.on_rtt(40);
    // No packets yet, half-RTT rule
    assert_eq!(handle.on_video_timing(300, 5_400), Some(5_380));

    handle.on_packet_received(0, 5_040);
    handle.on_packet_received(100, 5_120);
    handle.on_packet_received(200, 5_260);
    // 300 + 5_020 - 20
    assert_eq!(handle.on_video_timing(300, 5_400), Some(5_300));

    handle.reset();
    assert_eq!(handle.on_video_timing(300, 5_400), None);
}

#[test]
fn instances_from_one_module_are_independent() {
    let module = discover(&ExtensionConfig::with_module_path(common::built_library())).unwrap();
    let mut a = unsafe { EstimatorHandle::from_entry_points(module.entry_points()) };
    let mut b = unsafe { EstimatorHandle::from_entry_points(module.entry_points()) };

    a.on_rtt(40);
    a.on_packet_received(0, 5_000);
    b.on_rtt(100);

    assert_eq!(a.on_video_timing(10, 0), Some(4_990));
    assert_eq!(b.on_video_timing(10, 1_000), Some(950));

    drop(a);
    assert_eq!(b.on_video_timing(10, 1_000), Some(950));
}
