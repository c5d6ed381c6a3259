use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    job: Option<Job>,
    wake_up: bool,
    shutdown: bool,
    running: usize,
    completed: Vec<u64>,
}

struct PoolShared {
    state: Mutex<PoolState>,
    task_ready: Condvar,
    ack: Condvar,
}

/// Fixed-size pool of long-lived workers fed one job at a time through a
/// rendezvous: `dispatch` installs the job and blocks until exactly one
/// worker has claimed it. The scheduler already paces dispatches against
/// slot occupancy, so an auxiliary task queue would only hide
/// backpressure.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                job: None,
                wake_up: false,
                shutdown: false,
                running: 0,
                completed: vec![0; size],
            }),
            task_ready: Condvar::new(),
            ack: Condvar::new(),
        });

        let handles = (0..size)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("exec-worker-{i}"))
                    .spawn(move || worker_loop(i, &shared))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Hands one job to the pool. Returns once a worker owns it.
    pub fn dispatch(&self, job: Job) {
        let mut state = self.shared.state.lock().expect("pool state poisoned");
        state.job = Some(job);
        state.wake_up = true;
        self.shared.task_ready.notify_one();
        while state.wake_up {
            state = self
                .shared
                .ack
                .wait(state)
                .expect("pool ack condvar poisoned");
        }
    }

    /// True only when no worker is executing and no job awaits a claim.
    pub fn is_done(&self) -> bool {
        let state = self.shared.state.lock().expect("pool state poisoned");
        state.running == 0 && state.job.is_none()
    }

    /// Blocks until the pool drains.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock().expect("pool state poisoned");
        while state.running > 0 || state.job.is_some() {
            state = self
                .shared
                .ack
                .wait(state)
                .expect("pool ack condvar poisoned");
        }
    }

    /// Stops and joins every worker. Safe to call more than once; later
    /// calls find nothing left to join.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().expect("pool state poisoned");
            state.shutdown = true;
            self.shared.task_ready.notify_all();
        }
        let handles = std::mem::take(&mut *self.handles.lock().expect("pool handles poisoned"));
        for handle in handles {
            let _ = handle.join();
        }
        let state = self.shared.state.lock().expect("pool state poisoned");
        for (i, done) in state.completed.iter().enumerate() {
            tracing::debug!(target: "exec", worker = i, completed = *done, "pool worker joined");
        }
    }
}

fn worker_loop(index: usize, shared: &PoolShared) {
    loop {
        let job = {
            let mut state = shared.state.lock().expect("pool state poisoned");
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(job) = state.job.take() {
                    state.wake_up = false;
                    state.running += 1;
                    shared.ack.notify_all();
                    break job;
                }
                state = shared
                    .task_ready
                    .wait(state)
                    .expect("pool task condvar poisoned");
            }
        };

        // The job runs the accelerator call; no pool lock is held here.
        job();

        let mut state = shared.state.lock().expect("pool state poisoned");
        state.running -= 1;
        state.completed[index] += 1;
        shared.ack.notify_all();
    }
}
