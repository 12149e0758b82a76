//! C ABI entry points (§6).
//!
//! Every exported function takes `(base_ptr, region_size, errno_out, ...)`
//! and returns a plain `c_int`/`isize`: `0` (or a non-negative count) on
//! success, `-1` on failure with `*errno_out` set to the matching `libc`
//! constant — the contract §6 specifies for a host that dispatches
//! filesystem requests into this crate.
//!
//! Same shape as `crate-type = ["rlib", "cdylib", "staticlib"]` in
//! `Cargo.toml` plus `#[no_mangle] extern "C"` functions at a
//! module-loading boundary. Nothing above this module ever sees a raw
//! pointer (§4.A, §5) — this is the only place one is formed, and it is
//! never retained past the single call that receives it.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::slice;

use crate::error::Errno;
use crate::mount::Filesystem;

/// Builds the `&mut [u8]` region view for one call. `base_ptr` must point
/// at a live allocation of at least `region_size` bytes, owned by the host
/// for the duration of this call (§5: no pointer survives past it).
///
/// # Safety
/// `base_ptr` must be valid for reads and writes of `region_size` bytes for
/// the duration of this call, and must not alias any other live reference.
unsafe fn region_slice<'a>(base_ptr: *mut u8, region_size: usize) -> &'a mut [u8] {
    slice::from_raw_parts_mut(base_ptr, region_size)
}

/// # Safety
/// `path` must be a valid, NUL-terminated C string for the duration of this
/// call.
unsafe fn path_str<'a>(path: *const c_char) -> Result<&'a str, Errno> {
    if path.is_null() {
        return Err(Errno::Invalid);
    }
    CStr::from_ptr(path).to_str().map_err(|_| Errno::Invalid)
}

unsafe fn fail(errno_out: *mut c_int, err: Errno) -> c_int {
    if !errno_out.is_null() {
        *errno_out = err.to_raw();
    }
    -1
}

macro_rules! entry {
    ($base_ptr:expr, $region_size:expr, $errno_out:expr, $body:expr) => {{
        let bytes = region_slice($base_ptr, $region_size);
        let mut fs = match Filesystem::mount(bytes) {
            Ok(fs) => fs,
            Err(e) => return fail($errno_out, e),
        };
        match $body(&mut fs) {
            Ok(value) => value,
            Err(e) => return fail($errno_out, e),
        }
    }};
}

/// Fills `*mode_out`, `*nlink_out`, `*size_out`, `*atime_out`, `*mtime_out`,
/// `*uid_out`, `*gid_out`. `uid`/`gid` are passed straight through from the
/// host's request (§4.E: "fill uid/gid from arguments") and echoed back
/// unchanged — this filesystem has no owner concept of its own.
///
/// # Safety
/// All out-parameters must be valid for writes; see [`region_slice`] for the
/// region pointer's requirements.
#[no_mangle]
pub unsafe extern "C" fn regionfs_getattr(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
    uid: u32,
    gid: u32,
    mode_out: *mut u32,
    nlink_out: *mut u32,
    size_out: *mut u64,
    atime_out: *mut i64,
    mtime_out: *mut i64,
    uid_out: *mut u32,
    gid_out: *mut u32,
) -> c_int {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    let attr = entry!(base_ptr, region_size, errno_out, |fs: &mut Filesystem| fs.getattr(path, uid, gid));
    *mode_out = attr.mode;
    *nlink_out = attr.nlink;
    *size_out = attr.size;
    *atime_out = attr.atime;
    *mtime_out = attr.mtime;
    *uid_out = attr.uid;
    *gid_out = attr.gid;
    0
}

/// Returns the number of directory entries (excluding slot 0) in `*count_out`
/// and a heap array of NUL-terminated names in `*entries_out`. The caller
/// must free it with [`regionfs_free_dirents`].
///
/// # Safety
/// As [`regionfs_getattr`].
#[no_mangle]
pub unsafe extern "C" fn regionfs_readdir(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
    entries_out: *mut *mut *mut c_char,
    count_out: *mut usize,
) -> c_int {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    let names = entry!(base_ptr, region_size, errno_out, |fs: &mut Filesystem| fs.readdir(path));

    let mut c_strings: Vec<*mut c_char> = Vec::with_capacity(names.len());
    for name in &names {
        match CString::new(name.as_str()) {
            Ok(cstring) => c_strings.push(cstring.into_raw()),
            Err(_) => {
                // A name containing an interior NUL can't be turned into a
                // C string for the out-of-region array the host owns; §7
                // treats this as the same "host-heap allocation failure"
                // family as an outright allocation failure.
                for ptr in c_strings {
                    drop(CString::from_raw(ptr));
                }
                return fail(errno_out, Errno::NoMem);
            }
        }
    }

    let count = c_strings.len();
    let boxed = c_strings.into_boxed_slice();
    *entries_out = Box::into_raw(boxed) as *mut *mut c_char;
    *count_out = count;
    count as c_int
}

/// Frees an entries array previously returned by [`regionfs_readdir`].
///
/// # Safety
/// `entries`/`count` must be exactly the pair most recently returned by
/// [`regionfs_readdir`] and not freed already.
#[no_mangle]
pub unsafe extern "C" fn regionfs_free_dirents(entries: *mut *mut c_char, count: usize) {
    if entries.is_null() {
        return;
    }
    let boxed = Box::from_raw(slice::from_raw_parts_mut(entries, count));
    for ptr in boxed.iter() {
        drop(CString::from_raw(*ptr));
    }
}

macro_rules! path_only_op {
    ($name:ident, $method:ident) => {
        /// # Safety
        /// As [`regionfs_getattr`].
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            base_ptr: *mut u8,
            region_size: usize,
            errno_out: *mut c_int,
            path: *const c_char,
        ) -> c_int {
            let path = match path_str(path) {
                Ok(p) => p,
                Err(e) => return fail(errno_out, e),
            };
            entry!(base_ptr, region_size, errno_out, |fs: &mut Filesystem| fs.$method(path));
            0
        }
    };
}

path_only_op!(regionfs_mknod, mknod);
path_only_op!(regionfs_mkdir, mkdir);
path_only_op!(regionfs_rmdir, rmdir);
path_only_op!(regionfs_unlink, unlink);

/// # Safety
/// As [`regionfs_getattr`].
#[no_mangle]
pub unsafe extern "C" fn regionfs_open(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
) -> c_int {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    let bytes = region_slice(base_ptr, region_size);
    let fs = match Filesystem::mount(bytes) {
        Ok(fs) => fs,
        Err(e) => return fail(errno_out, e),
    };
    match fs.open(path) {
        Ok(()) => 0,
        Err(e) => fail(errno_out, e),
    }
}

/// # Safety
/// As [`regionfs_getattr`]. `new_size` is the same signed width the host's
/// `truncate` syscall receives.
#[no_mangle]
pub unsafe extern "C" fn regionfs_truncate(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
    new_size: i64,
) -> c_int {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    entry!(base_ptr, region_size, errno_out, |fs: &mut Filesystem| fs.truncate(path, new_size));
    0
}

/// Reads up to `count` bytes at `offset` into `buf`. Returns the number of
/// bytes copied, or `-1` with `*errno_out` set.
///
/// # Safety
/// `buf` must be valid for writes of `count` bytes; see [`region_slice`].
#[no_mangle]
pub unsafe extern "C" fn regionfs_read(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
    buf: *mut u8,
    count: usize,
    offset: u32,
) -> isize {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => {
            fail(errno_out, e);
            return -1;
        }
    };
    let count = match u32::try_from(count) {
        Ok(c) => c,
        Err(_) => {
            fail(errno_out, Errno::Invalid);
            return -1;
        }
    };
    let bytes = region_slice(base_ptr, region_size);
    let mut fs = match Filesystem::mount(bytes) {
        Ok(fs) => fs,
        Err(e) => {
            fail(errno_out, e);
            return -1;
        }
    };
    let data = match fs.read(path, offset, count) {
        Ok(d) => d,
        Err(e) => {
            fail(errno_out, e);
            return -1;
        }
    };
    let out = slice::from_raw_parts_mut(buf, data.len());
    out.copy_from_slice(&data);
    data.len() as isize
}

/// Writes `count` bytes from `buf` at `offset`. Returns the number of bytes
/// written, or `-1` with `*errno_out` set.
///
/// # Safety
/// `buf` must be valid for reads of `count` bytes; see [`region_slice`].
#[no_mangle]
pub unsafe extern "C" fn regionfs_write(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
    buf: *const u8,
    count: usize,
    offset: u32,
) -> isize {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => {
            fail(errno_out, e);
            return -1;
        }
    };
    let data = slice::from_raw_parts(buf, count);
    let bytes = region_slice(base_ptr, region_size);
    let mut fs = match Filesystem::mount(bytes) {
        Ok(fs) => fs,
        Err(e) => {
            fail(errno_out, e);
            return -1;
        }
    };
    match fs.write(path, offset, data) {
        Ok(n) => n as isize,
        Err(e) => {
            fail(errno_out, e);
            -1
        }
    }
}

/// # Safety
/// As [`regionfs_getattr`].
#[no_mangle]
pub unsafe extern "C" fn regionfs_utimens(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    path: *const c_char,
    atime: i64,
    mtime: i64,
) -> c_int {
    let path = match path_str(path) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    entry!(base_ptr, region_size, errno_out, |fs: &mut Filesystem| fs.utimens(path, atime, mtime));
    0
}

/// # Safety
/// As [`regionfs_getattr`]. `from`/`to` must both be valid NUL-terminated
/// C strings.
#[no_mangle]
pub unsafe extern "C" fn regionfs_rename(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    from: *const c_char,
    to: *const c_char,
) -> c_int {
    let from = match path_str(from) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    let to = match path_str(to) {
        Ok(p) => p,
        Err(e) => return fail(errno_out, e),
    };
    entry!(base_ptr, region_size, errno_out, |fs: &mut Filesystem| fs.rename(from, to));
    0
}

/// # Safety
/// As [`regionfs_getattr`], minus `path` (statfs takes none).
#[no_mangle]
pub unsafe extern "C" fn regionfs_statfs(
    base_ptr: *mut u8,
    region_size: usize,
    errno_out: *mut c_int,
    bsize_out: *mut u32,
    blocks_out: *mut u64,
    bfree_out: *mut u64,
    bavail_out: *mut u64,
    namemax_out: *mut u32,
) -> c_int {
    let bytes = region_slice(base_ptr, region_size);
    let fs = match Filesystem::mount(bytes) {
        Ok(fs) => fs,
        Err(e) => return fail(errno_out, e),
    };
    let info = match fs.statfs() {
        Ok(info) => info,
        Err(e) => return fail(errno_out, e),
    };
    *bsize_out = info.f_bsize;
    *blocks_out = info.f_blocks;
    *bfree_out = info.f_bfree;
    *bavail_out = info.f_bavail;
    *namemax_out = info.f_namemax;
    0
}
