pub mod syscall;

/// Monotonic timestamps are carried as nanosecond counts so that ordering
/// and equality are total; `(sec, nsec)` pairs exist only at the
/// serialization boundary.
pub fn monotonic_now() -> i64 {
    match syscall::clock_gettime(libc::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64,
        Err(e) => panic!("monotonic clock unavailable: {}", e),
    }
}

/// Sleeps until an absolute monotonic deadline, so periodic loops do not
/// accumulate drift. Deadlines in the past return immediately.
pub fn sleep_until(deadline_ns: i64) -> std::io::Result<()> {
    let deadline = libc::timespec {
        tv_sec: (deadline_ns / 1_000_000_000) as _,
        tv_nsec: (deadline_ns % 1_000_000_000) as _,
    };
    syscall::clock_nanosleep_abs(libc::CLOCK_MONOTONIC, &deadline)
}

// Dereferences the pointer and offsets by the size of the
// pointee type, then returns the dereferenced value.
#[inline]
pub unsafe fn deref_offset<T: Copy>(ptr: &mut *const u8) -> T {
    let val = (*ptr as *const T).read_unaligned();
    *ptr = ptr.add(size_of::<T>());
    val
}
