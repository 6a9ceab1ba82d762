// HOLODECK Shared Memory Region - named OS shared memory mapped into this process
//
// POSIX:   shm_open() + ftruncate() + memmap2 mapping, removed with shm_unlink()
// Windows: pagefile-backed CreateFileMappingW(), freed when the last handle closes
use std::io;

/// Named shared memory region mapped read/write into this process
#[derive(Debug)]
pub struct ShmRegion {
    mapping: sys::Mapping,
    size: usize,
    name: String,
    owner: bool,
    unlinked: bool,
}

impl ShmRegion {
    /// Create or open the region `name` and size it to exactly `size` bytes
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        let mapping = sys::Mapping::create(name, size)?;

        Ok(Self {
            mapping,
            size,
            name: name.to_string(),
            owner: true,
            unlinked: false,
        })
    }

    /// Open existing shared memory region (no creation)
    ///
    /// The mapping covers the whole region as sized by its creator.
    pub fn open(name: &str) -> io::Result<Self> {
        let mapping = sys::Mapping::open(name)?;
        let size = mapping.len();

        Ok(Self {
            mapping,
            size,
            name: name.to_string(),
            owner: false,
            unlinked: false,
        })
    }

    /// Remove the OS name of a region without mapping it
    pub fn unlink_name(name: &str) -> io::Result<()> {
        sys::unlink(name)
    }

    /// Remove the region's OS name so it cannot leak past this session
    ///
    /// Only the creating side unlinks; the mapping itself stays valid until
    /// the region is dropped. Calling this twice is a no-op.
    pub fn unlink(&mut self) -> io::Result<()> {
        if !self.owner || self.unlinked {
            return Ok(());
        }
        self.unlinked = true;
        sys::unlink(&self.name)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mapping.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mapping.as_mut_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is valid for `size` bytes while `self` lives
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let size = self.size;
        // SAFETY: as above, and `&mut self` guarantees no other local view
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), size) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

// Thread safety
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

#[cfg(unix)]
mod sys {
    use memmap2::{MmapMut, MmapOptions};
    use std::ffi::CString;
    use std::fs::File;
    use std::io;
    use std::os::unix::io::FromRawFd;

    const MODE: libc::mode_t = 0o600;

    #[derive(Debug)]
    pub struct Mapping {
        mmap: MmapMut,
        _file: File,
    }

    impl Mapping {
        pub fn create(name: &str, size: usize) -> io::Result<Self> {
            let file = shm_open(name, libc::O_CREAT | libc::O_RDWR)?;

            // macOS refuses to ftruncate a region twice, so leave a region
            // that already has the right size alone
            if file.metadata()?.len() != size as u64 {
                file.set_len(size as u64)?;
            }

            Self::map(file, size)
        }

        pub fn open(name: &str) -> io::Result<Self> {
            let file = shm_open(name, libc::O_RDWR)?;
            let size = file.metadata()?.len() as usize;
            Self::map(file, size)
        }

        fn map(file: File, size: usize) -> io::Result<Self> {
            let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
            Ok(Self { mmap, _file: file })
        }

        pub fn len(&self) -> usize {
            self.mmap.len()
        }

        pub fn as_ptr(&self) -> *const u8 {
            self.mmap.as_ptr()
        }

        pub fn as_mut_ptr(&mut self) -> *mut u8 {
            self.mmap.as_mut_ptr()
        }
    }

    fn c_name(name: &str) -> io::Result<CString> {
        CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains a NUL byte"))
    }

    fn shm_open(name: &str, flags: libc::c_int) -> io::Result<File> {
        let c_name = c_name(name)?;

        // shm_open is variadic on Apple targets
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, MODE as libc::c_uint) };

        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, MODE) };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = c_name(name)?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(windows)]
mod sys {
    use std::io;
    use std::mem;
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
        FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
    };

    pub struct Mapping {
        handle: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
        len: usize,
    }

    impl std::fmt::Debug for Mapping {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Mapping")
                .field("handle", &self.handle)
                .field("len", &self.len)
                .finish_non_exhaustive()
        }
    }

    fn wide(name: &str) -> Vec<u16> {
        name.encode_utf16().chain(std::iter::once(0)).collect()
    }

    impl Mapping {
        pub fn create(name: &str, size: usize) -> io::Result<Self> {
            let name = wide(name);
            let size64 = size as u64;
            let handle = unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    ptr::null(),
                    PAGE_READWRITE,
                    (size64 >> 32) as u32,
                    size64 as u32,
                    name.as_ptr(),
                )
            };
            if handle == 0 {
                return Err(io::Error::last_os_error());
            }
            Self::map(handle, size)
        }

        pub fn open(name: &str) -> io::Result<Self> {
            let name = wide(name);
            let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, name.as_ptr()) };
            if handle == 0 {
                return Err(io::Error::last_os_error());
            }
            let mut mapping = Self::map(handle, 0)?;

            let mut info: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
            let written = unsafe {
                VirtualQuery(
                    mapping.view.Value,
                    &mut info,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 {
                return Err(io::Error::last_os_error());
            }
            mapping.len = info.RegionSize;
            Ok(mapping)
        }

        fn map(handle: HANDLE, len: usize) -> io::Result<Self> {
            let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, len) };
            if view.Value.is_null() {
                let err = io::Error::last_os_error();
                unsafe { CloseHandle(handle) };
                return Err(err);
            }
            Ok(Self { handle, view, len })
        }

        pub fn len(&self) -> usize {
            self.len
        }

        pub fn as_ptr(&self) -> *const u8 {
            self.view.Value as *const u8
        }

        pub fn as_mut_ptr(&mut self) -> *mut u8 {
            self.view.Value as *mut u8
        }
    }

    impl Drop for Mapping {
        fn drop(&mut self) {
            unsafe {
                UnmapViewOfFile(self.view);
                CloseHandle(self.handle);
            }
        }
    }

    /// Named mappings live as long as a handle is open
    pub fn unlink(_name: &str) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/HOLODECK_TEST_{}_{}", tag, uuid::Uuid::new_v4().simple())
    }

    #[test]
    fn test_create_then_open_shares_memory() {
        let name = unique_name("share");
        let mut creator = ShmRegion::create(&name, 64).unwrap();
        assert!(creator.is_owner());
        assert_eq!(creator.size(), 64);
        creator.as_mut_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);

        let opener = ShmRegion::open(&name).unwrap();
        assert!(!opener.is_owner());
        assert_eq!(opener.size(), 64);
        assert_eq!(&opener.as_slice()[..4], &[1, 2, 3, 4]);

        creator.unlink().unwrap();
    }

    #[test]
    fn test_unlink_removes_name() {
        let name = unique_name("unlink");
        let mut region = ShmRegion::create(&name, 16).unwrap();
        region.unlink().unwrap();
        // second unlink is a no-op
        region.unlink().unwrap();

        let err = ShmRegion::open(&name).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_opener_never_unlinks() {
        let name = unique_name("opener");
        let mut creator = ShmRegion::create(&name, 16).unwrap();
        let mut opener = ShmRegion::open(&name).unwrap();
        opener.unlink().unwrap();

        assert!(ShmRegion::open(&name).is_ok());
        creator.unlink().unwrap();
    }

    #[test]
    fn test_open_missing_region_fails() {
        assert!(ShmRegion::open(&unique_name("missing")).is_err());
    }
}
