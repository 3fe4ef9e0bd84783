use framewatch_analysis::{encoder_stats, network_stats, AnalysisError};
use framewatch_protocol::{FieldValue, FrameDecoder, FrameRecord};

/// Helper: a video frame as the decoder would produce it.
fn video_frame(key: bool, pict: &str, pts: f64, size: f64) -> FrameRecord {
    FrameRecord::new()
        .with("media_type", "video")
        .with("key_frame", FieldValue::coerce(if key { "1" } else { "0" }))
        .with("pict_type", pict)
        .with("pkt_pts_time", FieldValue::coerce(&format!("{:.6}", pts)))
        .with("pkt_size", size)
        .with("width", 1280.0)
        .with("height", 720.0)
}

fn audio_frame(pts: f64, size: f64) -> FrameRecord {
    FrameRecord::new()
        .with("media_type", "audio")
        .with("key_frame", 1.0)
        .with("pkt_pts_time", FieldValue::coerce(&format!("{:.6}", pts)))
        .with("pkt_size", size)
}

/// Helper: `gops` GOPs of 25 frames at 25fps, plus the opening key frame of the next one.
fn steady_stream(gops: usize) -> Vec<FrameRecord> {
    let mut frames = Vec::new();
    for i in 0..(gops * 25) {
        let key = i % 25 == 0;
        frames.push(video_frame(key, if key { "I" } else { "P" }, i as f64 * 0.04, 1024.0));
    }
    frames.push(video_frame(true, "I", (gops * 25) as f64 * 0.04, 1024.0));
    frames
}

// ============================================================
// Encoder stats
// ============================================================

#[test]
fn test_encoder_stats_steady_stream() {
    let frames = steady_stream(3);
    let stats = encoder_stats(&frames).unwrap();
    let payload = &stats.payload;

    assert_eq!(payload.gop_count, 3);
    assert!((payload.fps.mean - 25.0).abs() < 1e-6);
    assert!((payload.gop_duration.mean - 1.0).abs() < 1e-6);
    // 25 frames * 1024 bytes per second = 200 kbps
    assert!((payload.bitrate.min - 200.0).abs() < 1e-6);
    assert!((payload.bitrate.max - 200.0).abs() < 1e-6);
    assert_eq!(payload.display_aspect_ratio, "16:9");
    assert_eq!(payload.width, 1280);
    assert_eq!(payload.height, 720);
    assert!(!payload.has_audio_stream);
    assert!(payload.are_all_gops_identical);
    assert_eq!(stats.remained_frames.len(), 1);
    assert!(stats.remained_frames[0].is_key_frame());
}

#[test]
fn test_encoder_stats_detects_audio_and_ignores_it_for_gops() {
    let mut frames = steady_stream(1);
    frames.insert(3, audio_frame(0.1, 300.0));
    frames.insert(10, audio_frame(0.3, 300.0));

    let stats = encoder_stats(&frames).unwrap();
    assert!(stats.payload.has_audio_stream);
    assert_eq!(stats.payload.gop_count, 1);
    assert!((stats.payload.fps.mean - 25.0).abs() < 1e-6);
    assert!(stats.remained_frames.iter().all(|f| f.is_video()));
}

#[test]
fn test_encoder_stats_requires_a_complete_gop() {
    let frames = vec![
        video_frame(false, "P", 0.0, 100.0),
        video_frame(true, "I", 0.04, 100.0),
        video_frame(false, "P", 0.08, 100.0),
    ];

    assert_eq!(encoder_stats(&frames).unwrap_err(), AnalysisError::NoGops);
    assert_eq!(encoder_stats(&[]).unwrap_err(), AnalysisError::NoGops);
}

#[test]
fn test_encoder_stats_remainder_continues_next_batch() {
    let frames = steady_stream(2);
    let (first, second) = frames.split_at(30);

    let err = encoder_stats(&first[..20]).unwrap_err();
    assert_eq!(err, AnalysisError::NoGops);

    let stats = encoder_stats(first).unwrap();
    assert_eq!(stats.payload.gop_count, 1);
    assert_eq!(stats.remained_frames.len(), 5);

    let mut next = stats.remained_frames;
    next.extend_from_slice(second);
    let stats = encoder_stats(&next).unwrap();
    assert_eq!(stats.payload.gop_count, 1);
    assert!((stats.payload.gop_duration.mean - 1.0).abs() < 1e-6);
}

#[test]
fn test_encoder_stats_reports_gop_drift() {
    let mut frames = steady_stream(2);
    frames[30].insert("pict_type", "B");

    let stats = encoder_stats(&frames).unwrap();
    assert!(!stats.payload.are_all_gops_identical);
}

#[test]
fn test_encoder_stats_rejects_bad_sizes() {
    let mut frames = steady_stream(1);
    frames[4].insert("pkt_size", "N/A");

    assert!(matches!(
        encoder_stats(&frames),
        Err(AnalysisError::InvalidGopFrame { gop: 0, frame: 4, .. })
    ));
}

#[test]
fn test_encoder_stats_rejects_dimensions_beyond_u32() {
    let mut frames = steady_stream(1);
    frames[0].insert("width", 5_000_000_000.0);

    assert_eq!(
        encoder_stats(&frames).unwrap_err(),
        AnalysisError::InvalidDimensions {
            width: 5_000_000_000.0,
            height: 720.0,
        }
    );
}

#[test]
fn test_encoder_stats_from_decoded_output() {
    let mut output = String::new();
    for i in 0..51 {
        let key = if i % 25 == 0 { 1 } else { 0 };
        let pict = if key == 1 { "I" } else { "P" };
        output.push_str(&format!(
            "[FRAME]\nmedia_type=video\nkey_frame={}\npict_type={}\npkt_size=2048\npkt_pts_time={:.6}\nwidth=640\nheight=480\n[/FRAME]\n",
            key,
            pict,
            i as f64 * 0.04
        ));
    }

    let mut decoder = FrameDecoder::new(1 << 20);
    let frames = decoder.decode(&output).unwrap();
    assert_eq!(frames.len(), 51);
    // first timestamp decodes as the text "0.000000"
    assert_eq!(frames[0].text("pkt_pts_time"), Some("0.000000"));

    let stats = encoder_stats(&frames).unwrap();
    assert_eq!(stats.payload.gop_count, 2);
    assert_eq!(stats.payload.display_aspect_ratio, "4:3");
    assert!((stats.payload.bitrate.mean - 400.0).abs() < 1e-6);
}

// ============================================================
// Network stats
// ============================================================

#[test]
fn test_network_stats_per_media_type() {
    let mut frames = steady_stream(1);
    frames.truncate(25);
    for i in 0..50 {
        frames.push(audio_frame(i as f64 * 0.02, 256.0));
    }

    let stats = network_stats(&frames, 2000.0).unwrap();
    assert_eq!(stats.len(), 2);

    let video = &stats["video"];
    assert_eq!(video.frames, 25);
    assert!((video.frame_rate - 12.5).abs() < 1e-9);
    assert!((video.bitrate - 100.0).abs() < 1e-9);

    let audio = &stats["audio"];
    assert_eq!(audio.frames, 50);
    assert!((audio.frame_rate - 25.0).abs() < 1e-9);
    assert!((audio.bitrate - 50.0).abs() < 1e-9);
}

#[test]
fn test_network_stats_groups_untyped_frames() {
    let frames = vec![FrameRecord::new().with("pkt_size", 128.0)];
    let stats = network_stats(&frames, 1000.0).unwrap();
    assert_eq!(stats["unknown"].frames, 1);
    assert!((stats["unknown"].bitrate - 1.0).abs() < 1e-9);
}

#[test]
fn test_network_stats_empty_window() {
    assert!(network_stats(&[], 1000.0).unwrap().is_empty());
}

#[test]
fn test_network_stats_invalid_inputs() {
    assert_eq!(
        network_stats(&[], 0.0).unwrap_err(),
        AnalysisError::InvalidDuration(0.0)
    );
    let frames = vec![FrameRecord::new().with("media_type", "video")];
    assert!(matches!(
        network_stats(&frames, 1000.0),
        Err(AnalysisError::InvalidFrame { index: 0, field: "pkt_size", .. })
    ));
}
