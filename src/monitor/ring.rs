use std::fs::{self, File, OpenOptions};
use std::io::Result;
use std::path::{Path, PathBuf};
use std::ptr::{null_mut, NonNull};
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{register_ring_file, unregister_ring_file};
use crate::ffi::syscall::{ftruncate, mmap, munmap};

/// Shared file mapping. The monitor is the only writer; the model
/// service maps the same file read-only on its side.
struct SharedMap {
    ptr: NonNull<u8>,
    len: usize,
}

impl SharedMap {
    fn new(file: &File, len: usize) -> Result<Self> {
        let prot = libc::PROT_READ | libc::PROT_WRITE;
        let flags = libc::MAP_SHARED;
        let ptr = unsafe { mmap(null_mut(), len, prot, flags, file, 0) }?;
        Ok(Self {
            ptr: NonNull::new(ptr).expect("mmap returned null"),
            len,
        })
    }
}

impl Drop for SharedMap {
    fn drop(&mut self) {
        match unsafe { munmap(self.ptr.as_ptr(), self.len) } {
            Ok(()) => (),
            Err(e) => panic!("Failed to unmap ring segment file: {}", e),
        }
    }
}

// Single writer per mapping; readers are external processes.
unsafe impl Send for SharedMap {}

/// One ring-mapped stream: `segments` fixed-size regions of a shared
/// backing file. The last word of each segment holds the count of valid
/// payload bytes and is stored last, with Release ordering, so a reader
/// that observes the footer observes the payload.
pub struct RingFile {
    map: SharedMap,
    seg_len: usize,
    segments: usize,
    path: PathBuf,
}

pub const FOOTER_LEN: usize = size_of::<u64>();

impl RingFile {
    pub fn create(path: &Path, seg_len: usize, segments: usize) -> Result<Self> {
        // Footer alignment: the mapping is page-aligned, so 8-divisible
        // segment lengths keep every footer word naturally aligned.
        assert!(seg_len > FOOTER_LEN && seg_len % FOOTER_LEN == 0 && segments >= 2);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let len = seg_len * segments;
        ftruncate(&file, len as i64)?;
        let map = SharedMap::new(&file, len)?;
        register_ring_file(path.to_path_buf());
        Ok(Self {
            map,
            seg_len,
            segments,
            path: path.to_path_buf(),
        })
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Payload area of one segment, footer excluded.
    pub fn payload_mut(&mut self, seg: usize) -> &mut [u8] {
        assert!(seg < self.segments);
        let start = seg * self.seg_len;
        unsafe {
            slice::from_raw_parts_mut(self.map.ptr.as_ptr().add(start), self.seg_len - FOOTER_LEN)
        }
    }

    fn footer_atom(&self, seg: usize) -> &AtomicU64 {
        assert!(seg < self.segments);
        let at = (seg + 1) * self.seg_len - FOOTER_LEN;
        unsafe { AtomicU64::from_ptr(self.map.ptr.as_ptr().add(at) as *mut u64) }
    }

    /// Publishes the segment: the byte count must be the last store.
    pub fn seal(&mut self, seg: usize, bytes: u64) {
        self.footer_atom(seg).store(bytes, Ordering::Release);
    }

    pub fn footer(&self, seg: usize) -> u64 {
        self.footer_atom(seg).load(Ordering::Acquire)
    }
}

impl Drop for RingFile {
    fn drop(&mut self) {
        unregister_ring_file(&self.path);
        let _ = fs::remove_file(&self.path);
    }
}

/// The three parallel per-window streams plus the shared write cursor.
/// With one measurement per training phase this degenerates to a
/// two-buffer ping-pong; otherwise one training phase holds every window
/// of the phase end-to-end while the model service drains them.
pub struct RingSet {
    pub power: RingFile,
    pub traces: RingFile,
    pub online: RingFile,
    cursor: usize,
}

impl RingSet {
    pub fn create(
        dir: &Path,
        segments: usize,
        power_seg: usize,
        traces_seg: usize,
        online_seg: usize,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            power: RingFile::create(&dir.join("power"), power_seg, segments)?,
            traces: RingFile::create(&dir.join("traces"), traces_seg, segments)?,
            online: RingFile::create(&dir.join("online"), online_seg, segments)?,
            cursor: 0,
        })
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.power.segments();
    }
}
