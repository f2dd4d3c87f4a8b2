// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Named shared-memory regions.
//!
//! A region is a fixed-size byte range backed by POSIX shared memory
//! (`shm_open` + `mmap`), addressable by name from any process on the host.
//! The region exposes raw bytes only; layout and coordination live in the
//! metrics group.
//!
//! Lifetime model: every handle unmaps on drop. The handle that created the
//! region also unlinks its name, after which the kernel frees the backing
//! pages once the last mapping is gone. Already-attached observers keep a
//! valid mapping across the unlink.

use std::ffi::CString;
use std::io;
use std::num::NonZeroUsize;
use std::os::unix::fs::MetadataExt;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::{trace, warn};

/// How [`NamedRegion::open`] resolves an existing name.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Create the region; fail with [`RegionError::AlreadyExists`] if the
    /// name is taken.
    CreateNew,
    /// Create the region, or attach if another process created it first.
    OpenOrCreate,
    /// Attach only; fail with [`RegionError::NotFound`] if nothing is
    /// published under the name.
    OpenExisting,
}

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("shared memory region {0:?} already exists")]
    AlreadyExists(String),

    #[error("shared memory region {0:?} does not exist")]
    NotFound(String),

    #[error("cannot create backing for shared memory region {name:?}")]
    BackingUnavailable {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot attach shared memory region {name:?}")]
    AttachFailed {
        name: String,
        #[source]
        source: io::Error,
    },
}

fn shm_path(name: &str) -> CString {
    // Short enough for the 31-character macos name limit.
    CString::new(format!("/ddmetrics-{name}")).unwrap_or_default()
}

/// A named, sized, shared byte region attached into this process.
pub struct NamedRegion {
    base: NonNull<u8>,
    size: usize,
    created: bool,
    name: String,
    /// Present on the creating handle only; dropped last to unlink the name.
    unlink_path: Option<CString>,
}

// SAFETY: the mapping is plain shared bytes; all concurrent access goes
// through atomics or is tolerated as torn by the counter protocol.
unsafe impl Send for NamedRegion {}
unsafe impl Sync for NamedRegion {}

impl NamedRegion {
    /// Opens or creates the region `name` with `size` bytes.
    ///
    /// For `OpenOrCreate` the first caller wins creation; everyone else
    /// attaches. When attaching to an existing region the actual size is
    /// taken from the backing object, not from `size`; the caller may not
    /// know the full layout yet.
    pub fn open(name: &str, size: usize, mode: OpenMode) -> Result<Self, RegionError> {
        let path = shm_path(name);

        let (fd, created) = match mode {
            OpenMode::CreateNew => (Self::create_fd(name, &path)?, true),
            OpenMode::OpenExisting => (Self::open_fd(name, &path)?, false),
            OpenMode::OpenOrCreate => match Self::create_fd(name, &path) {
                Ok(fd) => (fd, true),
                Err(RegionError::AlreadyExists(_)) => (Self::open_fd(name, &path)?, false),
                Err(e) => return Err(e),
            },
        };

        let size = if created {
            ftruncate(&fd, size as libc::off_t).map_err(|e| {
                let _ = shm_unlink(path.as_c_str());
                RegionError::BackingUnavailable {
                    name: name.to_owned(),
                    source: e.into(),
                }
            })?;
            size
        } else {
            // The attacher may not know the full layout yet; the backing
            // object knows its own size.
            let file = std::fs::File::from(fd);
            let size = file
                .metadata()
                .map_err(|e| RegionError::AttachFailed {
                    name: name.to_owned(),
                    source: e,
                })?
                .size() as usize;
            return Self::map(file, size, false, name, None);
        };

        Self::map(fd, size, created, name, created.then_some(path))
    }

    fn map<F: std::os::fd::AsFd>(
        fd: F,
        size: usize,
        created: bool,
        name: &str,
        unlink_path: Option<CString>,
    ) -> Result<Self, RegionError> {
        let len = NonZeroUsize::new(size).ok_or_else(|| RegionError::AttachFailed {
            name: name.to_owned(),
            source: io::Error::new(io::ErrorKind::InvalidData, "region is not sized yet"),
        })?;

        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                Some(&fd),
                0,
            )
        }
        .map_err(|e| {
            warn!("failed to map shared memory region {name:?}: {e}");
            if let Some(ref path) = unlink_path {
                let _ = shm_unlink(path.as_c_str());
            }
            RegionError::AttachFailed {
                name: name.to_owned(),
                source: e.into(),
            }
        })?;

        trace!(
            "{} shared memory region {name:?} ({size} bytes)",
            if created { "created" } else { "attached" }
        );

        Ok(NamedRegion {
            // SAFETY: mmap returns a non-null pointer on success.
            base: unsafe { NonNull::new_unchecked(ptr as *mut u8) },
            size,
            created,
            name: name.to_owned(),
            unlink_path,
        })
    }

    fn create_fd(name: &str, path: &CString) -> Result<std::os::fd::OwnedFd, RegionError> {
        shm_open(
            path.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP,
        )
        .map_err(|e| match e {
            Errno::EEXIST => RegionError::AlreadyExists(name.to_owned()),
            e => RegionError::BackingUnavailable {
                name: name.to_owned(),
                source: e.into(),
            },
        })
    }

    fn open_fd(name: &str, path: &CString) -> Result<std::os::fd::OwnedFd, RegionError> {
        shm_open(path.as_c_str(), OFlag::O_RDWR, Mode::empty()).map_err(|e| match e {
            Errno::ENOENT => RegionError::NotFound(name.to_owned()),
            e => RegionError::AttachFailed {
                name: name.to_owned(),
                source: e.into(),
            },
        })
    }

    /// Removes a region name without attaching. Useful for clearing a stale
    /// region left behind by a crashed producer. Returns whether a name was
    /// actually removed.
    pub fn unlink(name: &str) -> bool {
        shm_unlink(shm_path(name).as_c_str()).is_ok()
    }

    /// True exactly when this call produced the region: always for
    /// `CreateNew`, for the winning caller under `OpenOrCreate`, never for
    /// `OpenExisting`. Drives initialize-vs-validate in the group.
    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.size) }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.size) }
    }
}

impl Drop for NamedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.base.as_ptr() as *mut libc::c_void, self.size);
        }
        if let Some(path) = self.unlink_path.take() {
            let _ = shm_unlink(path.as_c_str());
        }
    }
}
