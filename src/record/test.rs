use super::store::{OutputLog, RecordStore};
use super::{split_timestamp, KernelRecord, RecordSnapshot, ENCODED_RECORD_LEN, TIME_SENTINEL};
use crate::config::NUM_LABELS;

fn record(id: u32, label: u32, cu: u32) -> KernelRecord {
    KernelRecord::new(id, label, 1, cu, 0.0, 0)
}

#[test]
fn sentinel_splits_to_maximal_pair() {
    assert_eq!(split_timestamp(TIME_SENTINEL), (i64::MAX, i64::MAX));
    assert_eq!(split_timestamp(1_500_000_001), (1, 500_000_001));
}

#[test]
fn encode_decode_round_trip() {
    let rec = KernelRecord::new(7, 3, 25, 4, 12.5, 2_000_000_000);
    rec.store_arrival(3_000_000_123);
    rec.store_finish(4_000_000_456);
    rec.store_pre_exec(3_000_000_200);
    rec.store_post_exec(3_999_999_000);
    rec.set_slot_mask(0b0011_1100);

    let mut buf = Vec::new();
    rec.encode_into(&mut buf);
    assert_eq!(buf.len(), ENCODED_RECORD_LEN);

    let snap = RecordSnapshot::decode(&buf).unwrap();
    assert_eq!(snap.id, 7);
    assert_eq!(snap.label, 3);
    assert_eq!(snap.executions, 25);
    assert_eq!(snap.cu, 4);
    assert_eq!(snap.intended_arrival_ms, 12.5);
    assert_eq!(snap.commanded_arrival, 2_000_000_000);
    assert_eq!(snap.measured_arrival, 3_000_000_123);
    assert_eq!(snap.measured_finish, 4_000_000_456);
    assert_eq!(snap.slot_mask, 0b0011_1100);
}

#[test]
fn unset_record_decodes_with_sentinels() {
    let rec = record(0, 0, 1);
    let mut buf = Vec::new();
    rec.encode_into(&mut buf);
    let snap = RecordSnapshot::decode(&buf).unwrap();
    assert_eq!(snap.measured_arrival, TIME_SENTINEL);
    assert_eq!(snap.measured_finish, TIME_SENTINEL);
    assert_eq!(snap.slot_mask, 0);
}

#[test]
fn scan_skips_wide_kernels() {
    let store = RecordStore::new();
    store.append(record(0, 1, 8));
    store.append(record(1, 2, 1));

    let dup = [0; NUM_LABELS];
    let got = store
        .scan_and_remove_first_executable(4, &dup)
        .expect("narrow kernel fits");
    assert_eq!(got.id, 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn scan_skips_duplicated_labels_in_head_order() {
    let store = RecordStore::new();
    store.append(record(0, 5, 1));
    store.append(record(1, 5, 1));
    store.append(record(2, 6, 1));

    let mut dup = [0u32; NUM_LABELS];
    let first = store.scan_and_remove_first_executable(8, &dup).unwrap();
    assert_eq!(first.id, 0);

    // Label 5 is now live: the second label-5 record is skipped and the
    // label-6 record leapfrogs it.
    dup[5] = 1;
    let second = store.scan_and_remove_first_executable(8, &dup).unwrap();
    assert_eq!(second.id, 2);

    // Nothing executable while label 5 stays live.
    assert!(store.scan_and_remove_first_executable(8, &dup).is_none());
    assert_eq!(store.len(), 1);

    dup[5] = 0;
    let third = store.scan_and_remove_first_executable(8, &dup).unwrap();
    assert_eq!(third.id, 1);
    assert!(store.is_empty());
}

#[test]
fn output_log_preserves_dispatch_order() {
    let log = OutputLog::new();
    for id in [4, 2, 9] {
        log.push(std::sync::Arc::new(record(id, 0, 1)));
    }
    assert_eq!(log.ids(), vec![4, 2, 9]);
    assert_eq!(log.len(), 3);
}
