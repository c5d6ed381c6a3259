use super::cpu::CpuUsage;
use super::online::{OnlineRecord, OnlineWriter};
use super::ring::{RingFile, RingSet};
use super::{window_disposition, write_power, write_traces, MonitorWindow};
use crate::record::TIME_SENTINEL;

const M0: i64 = 1_000;
const MF: i64 = 2_000;

#[test]
fn finished_inside_window_is_written_not_retained() {
    let (write, retain) = window_disposition(1_100, 1_900, M0, MF);
    assert!(write);
    assert!(!retain);
}

#[test]
fn straddling_finish_is_written_and_retained() {
    let (write, retain) = window_disposition(1_100, 2_500, M0, MF);
    assert!(write);
    assert!(retain);
}

#[test]
fn unstarted_record_is_retained_silently() {
    // Both timestamps at the sentinel: not started yet, must neither be
    // written nor dropped.
    let (write, retain) = window_disposition(TIME_SENTINEL, TIME_SENTINEL, M0, MF);
    assert!(!write);
    assert!(retain);
}

#[test]
fn started_but_running_is_written_and_retained() {
    let (write, retain) = window_disposition(1_500, TIME_SENTINEL, M0, MF);
    assert!(write);
    assert!(retain);
}

#[test]
fn finished_before_window_is_dropped() {
    let (write, retain) = window_disposition(100, 900, M0, MF);
    assert!(!write);
    assert!(!retain);
}

#[test]
fn arriving_after_window_is_retained_silently() {
    let (write, retain) = window_disposition(2_100, 2_900, M0, MF);
    assert!(!write);
    assert!(retain);
}

#[test]
fn online_record_frames_per_slot() {
    let cpu = CpuUsage {
        user: 12.5,
        kernel: 3.0,
        idle: 84.5,
    };
    let window = MonitorWindow {
        initial: 1_000_000_000,
        start: 1_000_100_000,
        finish: 1_001_000_000,
    };

    let mut buf = vec![0u8; 4096];
    let mut writer = OnlineWriter::new(&mut buf);
    writer.header(&cpu, &window, 3);
    writer.kernel(4, 900_000_000, 1_000_500_000);
    writer.kernel(7, 999_000_000, TIME_SENTINEL);
    writer.end_of_slot();
    writer.end_of_slot();
    writer.kernel(4, 900_000_000, 1_000_500_000);
    writer.end_of_slot();
    let bytes = writer.finish().unwrap();

    let rec = OnlineRecord::parse(&buf[..bytes]).expect("framing parses");
    assert_eq!(rec.cpu, cpu);
    assert_eq!(rec.initial, (1, 0));
    assert_eq!(rec.start, (1, 100_000));
    assert_eq!(rec.slots.len(), 3);
    assert_eq!(rec.slots[0].len(), 2);
    assert!(rec.slots[1].is_empty());
    assert_eq!(rec.slots[2].len(), 1);

    assert_eq!(rec.slots[0][0].label, 4);
    assert_eq!(rec.slots[0][0].arrival, (0, 900_000_000));
    // A running kernel's finish rides at the sentinel pair.
    assert_eq!(rec.slots[0][1].finish, (i64::MAX, i64::MAX));
}

#[test]
fn online_writer_reports_overflow() {
    let cpu = CpuUsage::default();
    let window = MonitorWindow {
        initial: 0,
        start: 0,
        finish: 0,
    };
    let mut buf = vec![0u8; 64];
    let mut writer = OnlineWriter::new(&mut buf);
    writer.header(&cpu, &window, 1);
    writer.kernel(0, 0, 0);
    writer.end_of_slot();
    assert!(writer.finish().is_err());
}

#[test]
fn power_and_trace_writers_check_capacity() {
    let mut buf = vec![0u8; 16];
    assert_eq!(write_power(&mut buf, 1.0, &[1.0, 2.0]).unwrap(), 12);
    assert!(write_power(&mut buf, 1.0, &[0.0; 8]).is_err());
    assert_eq!(write_traces(&mut buf, &[1, 2, 3]).unwrap(), 12);
    assert!(write_traces(&mut buf, &[0; 5]).is_err());
}

#[test]
fn ring_file_seals_and_isolates_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("online");
    let seg_len = 512;

    {
        let mut ring = RingFile::create(&path, seg_len, 3).unwrap();
        ring.payload_mut(0)[..4].copy_from_slice(&[1, 2, 3, 4]);
        ring.seal(0, 4);
        ring.payload_mut(2)[..2].copy_from_slice(&[9, 9]);
        ring.seal(2, 2);

        assert_eq!(ring.footer(0), 4);
        assert_eq!(ring.footer(1), 0);
        assert_eq!(ring.footer(2), 2);

        // The shared mapping is coherent with the backing file.
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), seg_len * 3);
        assert_eq!(&raw[..4], &[1, 2, 3, 4]);
        assert_eq!(
            u64::from_le_bytes(raw[seg_len - 8..seg_len].try_into().unwrap()),
            4
        );
        // Sealing segment 2 perturbed nothing in segment 1.
        assert!(raw[seg_len..2 * seg_len - 8].iter().all(|&b| b == 0));
        assert_eq!(&raw[2 * seg_len..2 * seg_len + 2], &[9, 9]);
    }

    // Dropping the ring removes the backing file.
    assert!(!path.exists());
}

#[test]
fn ring_set_rotates_round_robin() {
    let dir = tempfile::tempdir().unwrap();
    let mut rings = RingSet::create(dir.path(), 3, 256, 256, 256).unwrap();

    // Six windows walk the cursor 0, 1, 2, 0, 1, 2; each write must land
    // in its own segment and leave the others untouched.
    for window in 0..6u8 {
        let seg = rings.cursor();
        assert_eq!(seg, window as usize % 3);
        rings.online.payload_mut(seg)[0] = window + 1;
        rings.online.seal(seg, 1);
        rings.advance();

        let raw = std::fs::read(dir.path().join("online")).unwrap();
        for other in 0..3i32 {
            // Latest window that wrote this segment, if any yet.
            let last = window as i32 - (window as i32 - other).rem_euclid(3);
            let expect = if last >= 0 { last as u8 + 1 } else { 0 };
            assert_eq!(
                raw[other as usize * 256],
                expect,
                "window {window}, segment {other}"
            );
        }
    }
}
