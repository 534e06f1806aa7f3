//! Buffer ring tests against the scripted device

mod helpers;

use helpers::MockDevice;
use pcmflow_out::audio::{OutputFormat, Payload, SourceState};
use pcmflow_out::stream::{BufferRing, MAX_BUFFERS};

#[test]
fn test_allocates_requested_buffers() {
    let device = MockDevice::new("Mock");
    let ring = BufferRing::new(device.clone(), 4).unwrap();

    assert_eq!(ring.capacity(), 4);
    assert_eq!(ring.buffer_ids(), &[100, 101, 102, 103]);
    assert_eq!(device.log().allocated.len(), 4);
}

#[test]
fn test_ring_size_is_bounded() {
    let device = MockDevice::new("Mock");
    assert_eq!(BufferRing::new(device.clone(), 1).unwrap().capacity(), 2);
    assert_eq!(
        BufferRing::new(device.clone(), 500).unwrap().capacity(),
        MAX_BUFFERS
    );
}

#[test]
fn test_free_slot_tracks_queue() {
    let device = MockDevice::new("Mock");
    let mut ring = BufferRing::new(device.clone(), 2).unwrap();
    let samples = [0i16; 8];

    for _ in 0..2 {
        assert!(ring.has_free_slot());
        ring.fill(Payload::StereoI16(&samples), 48000).unwrap();
        ring.submit().unwrap();
        ring.advance_cursor();
    }
    assert!(!ring.has_free_slot());
    assert_eq!(ring.reclaim_processed(), 0);
    assert!(!ring.has_free_slot());

    device.complete(1);
    assert_eq!(ring.reclaim_processed(), 1);
    assert_eq!(ring.queued(), 1);
    assert!(ring.has_free_slot());
    assert_eq!(ring.cursor(), 0);
}

#[test]
fn test_fill_reports_format_rejection() {
    let device = MockDevice::new("Mock");
    device.reject(OutputFormat::StereoF32);
    let mut ring = BufferRing::new(device.clone(), 2).unwrap();

    let err = ring.fill(Payload::StereoF32(&[0.0; 4]), 48000).unwrap_err();
    assert!(err.is_format_unsupported());
    assert!(ring.fill(Payload::StereoI16(&[0; 4]), 48000).is_ok());
}

#[test]
fn test_ensure_playing_only_when_stopped() {
    let device = MockDevice::new("Mock");
    let ring = BufferRing::new(device.clone(), 2).unwrap();

    assert!(ring.ensure_playing().unwrap());
    assert!(!ring.ensure_playing().unwrap());
    assert_eq!(device.log().play_calls, 1);

    device.log().state = SourceState::Stopped;
    assert!(ring.ensure_playing().unwrap());
    assert_eq!(device.log().play_calls, 2);
}

#[test]
fn test_release_order() {
    let device = MockDevice::new("Mock");
    let mut ring = BufferRing::new(device.clone(), 3).unwrap();
    ring.fill(Payload::StereoI16(&[0; 4]), 48000).unwrap();
    ring.submit().unwrap();

    ring.release();

    let log = device.log();
    assert_eq!(log.events, vec!["stop", "detach", "delete"]);
    assert!(log.allocated.is_empty());
    assert!(log.queue.is_empty());
    drop(log);
    assert_eq!(ring.capacity(), 0);
    assert_eq!(ring.queued(), 0);
}
