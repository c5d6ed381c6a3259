use std::fs::File;
use std::io::{Error, Result};
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::ptr::null_mut;

pub fn clock_gettime(clock: libc::clockid_t) -> Result<libc::timespec> {
    let mut ts = MaybeUninit::uninit();
    let result = unsafe { libc::clock_gettime(clock, ts.as_mut_ptr()) };
    if result != -1 {
        Ok(unsafe { ts.assume_init() })
    } else {
        Err(Error::last_os_error())
    }
}

// `clock_nanosleep` reports errors via its return value, not errno.
pub fn clock_nanosleep_abs(clock: libc::clockid_t, deadline: &libc::timespec) -> Result<()> {
    loop {
        let errno =
            unsafe { libc::clock_nanosleep(clock, libc::TIMER_ABSTIME, deadline, null_mut()) };
        match errno {
            0 => return Ok(()),
            libc::EINTR => continue,
            _ => return Err(Error::from_raw_os_error(errno)),
        }
    }
}

pub fn ftruncate(file: &File, len: i64) -> Result<()> {
    let result = unsafe { libc::ftruncate(file.as_raw_fd(), len) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn mmap<T>(
    ptr: *mut (),
    len: usize,
    prot: i32,
    flags: i32,
    file: &File,
    offset: i64,
) -> Result<*mut T> {
    let ptr = libc::mmap(ptr as _, len, prot, flags, file.as_raw_fd(), offset);
    if ptr != libc::MAP_FAILED {
        Ok(ptr as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn munmap<T>(ptr: *mut T, len: usize) -> Result<()> {
    let result = libc::munmap(ptr as _, len);
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}
