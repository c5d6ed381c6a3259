//! End-to-end scheduling scenarios against the synthetic accelerator.

use std::fs;
use std::io::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fpga_sched::config::{RuntimeOpts, NUM_LABELS, NUM_SLOTS};
use fpga_sched::hal::Accelerator;
use fpga_sched::record::RecordSnapshot;
use fpga_sched::runtime::Runtime;

/// Accelerator stand-in that checks the dispatch invariants on entry of
/// every call: mask width matches the compute units, no slot is shared
/// with another in-flight kernel, and no label runs twice at once.
struct TrackingHal {
    work: Duration,
    active: Mutex<Vec<(u32, u32)>>,
    violations: Mutex<Vec<String>>,
    peak_busy_slots: Mutex<u32>,
}

impl TrackingHal {
    fn new(work: Duration) -> Self {
        Self {
            work,
            active: Mutex::new(Vec::new()),
            violations: Mutex::new(Vec::new()),
            peak_busy_slots: Mutex::new(0),
        }
    }

    fn assert_clean(&self) {
        let violations = self.violations.lock().unwrap();
        assert!(violations.is_empty(), "invariants violated: {violations:?}");
    }
}

impl Accelerator for TrackingHal {
    fn execute_kernel(&self, label: u32, cu: u32, slot_mask: u32, executions: u32) -> Result<()> {
        {
            let mut active = self.active.lock().unwrap();
            let mut violations = self.violations.lock().unwrap();
            if slot_mask.count_ones() != cu {
                violations.push(format!("kernel label {label}: mask {slot_mask:#b} vs cu {cu}"));
            }
            for (other_mask, other_label) in active.iter() {
                if other_mask & slot_mask != 0 {
                    violations.push(format!(
                        "slot overlap: {slot_mask:#b} against {other_mask:#b}"
                    ));
                }
                if *other_label == label {
                    violations.push(format!("label {label} dispatched twice"));
                }
            }
            active.push((slot_mask, label));

            let busy: u32 = active.iter().map(|(m, _)| m.count_ones()).sum();
            if busy > NUM_SLOTS as u32 {
                violations.push(format!("{busy} slots busy"));
            }
            let mut peak = self.peak_busy_slots.lock().unwrap();
            *peak = (*peak).max(busy);
        }

        std::thread::sleep(self.work * executions);

        let mut active = self.active.lock().unwrap();
        active.retain(|(m, _)| *m != slot_mask);
        Ok(())
    }
}

fn write_workload(dir: &Path, index: usize, kernels: &[(f32, i32, i32)]) {
    let mut arrivals = Vec::new();
    let mut labels = Vec::new();
    let mut execs = Vec::new();
    for (a, l, n) in kernels {
        arrivals.extend_from_slice(&a.to_le_bytes());
        labels.extend_from_slice(&l.to_le_bytes());
        execs.extend_from_slice(&n.to_le_bytes());
    }
    fs::write(dir.join(format!("inter_arrival_{index}.bin")), arrivals).unwrap();
    fs::write(dir.join(format!("kernel_id_{index}.bin")), labels).unwrap();
    fs::write(dir.join(format!("num_executions_{index}.bin")), execs).unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    opts: RuntimeOpts,
}

fn fixture(label_cu: [u32; NUM_LABELS]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let opts = RuntimeOpts {
        data_dir: dir.path().join("data"),
        ring_dir: dir.path().join("rings"),
        output_path: dir.path().join("kernels_info.bin"),
        measurements_per_training: 4,
        window_period: Duration::from_millis(50),
        startup_delay: Duration::from_millis(20),
        label_cu,
        model: None,
    };
    fs::create_dir_all(&opts.data_dir).unwrap();
    Fixture { _dir: dir, opts }
}

fn narrow_cu() -> [u32; NUM_LABELS] {
    [1; NUM_LABELS]
}

fn wide_first_cu() -> [u32; NUM_LABELS] {
    let mut cu = [1; NUM_LABELS];
    cu[0] = NUM_SLOTS as u32;
    cu
}

#[test]
fn single_narrow_kernel_runs_to_completion() {
    let f = fixture(narrow_cu());
    write_workload(&f.opts.data_dir, 0, &[(0.0, 3, 1)]);

    let hal = Arc::new(TrackingHal::new(Duration::from_millis(5)));
    let output_path = f.opts.output_path.clone();
    let mut rt = Runtime::new(f.opts, hal.clone(), Box::<fpga_sched::monitor::probe::SyntheticProbe>::default()).unwrap();
    rt.run_workload(0).unwrap();
    rt.shutdown().unwrap();

    hal.assert_clean();
    assert_eq!(*hal.peak_busy_slots.lock().unwrap(), 1);

    let records = RecordSnapshot::decode_all(&fs::read(output_path).unwrap());
    assert_eq!(records.len(), 1);
    let rec = &records[0];
    assert_eq!(rec.label, 3);
    assert_eq!(rec.slot_mask.count_ones(), 1);
    assert!(rec.measured_arrival <= rec.measured_pre_exec);
    assert!(rec.measured_pre_exec <= rec.measured_post_exec);
    assert!(rec.measured_post_exec <= rec.measured_finish);
}

#[test]
fn wide_kernel_blocks_narrows_until_completion() {
    let f = fixture(wide_first_cu());
    // One full-width kernel, then ten single-slot kernels with distinct
    // labels arriving 1 ms later.
    let mut kernels = vec![(0.0f32, 0, 10)];
    kernels.push((1.0, 1, 1));
    for label in 2..=10 {
        kernels.push((0.0, label, 1));
    }
    write_workload(&f.opts.data_dir, 0, &kernels);

    let hal = Arc::new(TrackingHal::new(Duration::from_millis(4)));
    let mut rt = Runtime::new(f.opts, hal.clone(), Box::<fpga_sched::monitor::probe::SyntheticProbe>::default()).unwrap();
    rt.run_workload(0).unwrap();

    // Dispatch order is head order: the wide kernel first, then the
    // narrows as the fabric frees up.
    assert_eq!(rt.output().ids(), (0..=10).collect::<Vec<_>>());
    rt.shutdown().unwrap();
    hal.assert_clean();
}

#[test]
fn duplicate_label_is_leapfrogged() {
    let f = fixture(narrow_cu());
    // Two label-5 kernels, then a label-6 kernel. The long-running first
    // label-5 blocks its twin; label 6 overtakes it.
    write_workload(
        &f.opts.data_dir,
        0,
        &[(0.0, 5, 20), (1.0, 5, 1), (1.0, 6, 1)],
    );

    let hal = Arc::new(TrackingHal::new(Duration::from_millis(4)));
    let mut rt = Runtime::new(f.opts, hal.clone(), Box::<fpga_sched::monitor::probe::SyntheticProbe>::default()).unwrap();
    rt.run_workload(0).unwrap();

    assert_eq!(rt.output().ids(), vec![0, 2, 1]);
    rt.shutdown().unwrap();
    hal.assert_clean();
}

#[test]
fn every_admitted_kernel_reaches_the_report_exactly_once() {
    let f = fixture(narrow_cu());
    let kernels: Vec<(f32, i32, i32)> = (0..30)
        .map(|i| (0.5, (i % NUM_LABELS as i32), 1 + i % 4))
        .collect();
    write_workload(&f.opts.data_dir, 0, &kernels);
    write_workload(&f.opts.data_dir, 1, &kernels[..10]);

    let hal = Arc::new(TrackingHal::new(Duration::from_millis(2)));
    let output_path = f.opts.output_path.clone();
    let mut rt = Runtime::new(f.opts, hal.clone(), Box::<fpga_sched::monitor::probe::SyntheticProbe>::default()).unwrap();
    rt.run_workload(0).unwrap();
    rt.run_workload(1).unwrap();
    rt.shutdown().unwrap();
    hal.assert_clean();

    let records = RecordSnapshot::decode_all(&fs::read(output_path).unwrap());
    assert_eq!(records.len(), 40);
    let mut ids: Vec<u32> = records.iter().map(|r| r.id).collect();
    ids.dedup();
    assert_eq!(ids, (0..40).collect::<Vec<_>>());
    for rec in &records {
        assert_eq!(rec.slot_mask.count_ones(), rec.cu);
    }
}

#[test]
fn shutdown_twice_behaves_like_once() {
    let f = fixture(narrow_cu());
    write_workload(&f.opts.data_dir, 0, &[(0.0, 1, 1)]);

    let ring_dir = f.opts.ring_dir.clone();
    let hal = Arc::new(TrackingHal::new(Duration::from_millis(2)));
    let mut rt = Runtime::new(f.opts, hal, Box::<fpga_sched::monitor::probe::SyntheticProbe>::default()).unwrap();
    rt.run_workload(0).unwrap();

    rt.shutdown().unwrap();
    assert!(!ring_dir.join("online").exists());
    rt.shutdown().unwrap();
    assert!(!ring_dir.join("online").exists());
}
