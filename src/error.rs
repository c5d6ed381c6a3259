use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

/// Failure kinds of the runtime. `Admission` rejections and the
/// monitor's over-threshold read (handled in place) are the recoverable
/// kinds; everything else is fatal, because the process cannot partially
/// unwind a dispatched kernel.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Malformed workload input, rejected before any record is admitted.
    /// Surfaces as a clean failure, never through the fatal path.
    #[error("[SCHED] admission rejected: {reason}")]
    Admission { reason: String },

    #[error("[{component}] invariant violated: {reason}")]
    Invariant {
        component: &'static str,
        reason: String,
    },

    #[error("[EXEC] accelerator failure on kernel {id}: {source}")]
    Hal {
        id: u32,
        #[source]
        source: io::Error,
    },

    #[error("[MONITOR] {context}: {source}")]
    Monitor {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("[MONITOR] model service: {0}")]
    Model(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RuntimeError {
    pub fn admission(reason: impl Into<String>) -> Self {
        Self::Admission {
            reason: reason.into(),
        }
    }

    pub fn invariant(component: &'static str, reason: impl Into<String>) -> Self {
        Self::Invariant {
            component,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

static RING_FILES: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Ring backing files register here so a fatal exit can unlink them and
/// the external model service does not block on a stale mapping.
pub fn register_ring_file(path: PathBuf) {
    RING_FILES
        .lock()
        .expect("ring file registry poisoned")
        .push(path);
}

pub fn unregister_ring_file(path: &PathBuf) {
    let mut files = RING_FILES.lock().expect("ring file registry poisoned");
    files.retain(|p| p != path);
}

/// Terminates the process on an unrecoverable error, after best-effort
/// removal of the shared-memory ring files.
pub fn fatal(err: &RuntimeError) -> ! {
    tracing::error!(target: "runtime", "{err}");
    let files = std::mem::take(&mut *RING_FILES.lock().expect("ring file registry poisoned"));
    for path in files {
        let _ = std::fs::remove_file(path);
    }
    std::process::exit(1);
}
