use super::dtype::{DType, Element};
use super::platform::{check_component, memory_name};
use super::shm_region::ShmRegion;
use crate::error::{HolodeckError, HolodeckResult};

/// Named, shaped, typed block of memory shared with the engine
///
/// The bytes are `shape` elements of `dtype` in row-major order using the
/// element type's native width. Nothing stops the peer from writing out of
/// turn; access is only exclusive under the handshake protocol.
#[derive(Debug)]
pub struct SharedBuffer {
    key: String,
    shape: Vec<usize>,
    dtype: DType,
    byte_len: usize,
    region: ShmRegion,
}

impl SharedBuffer {
    /// Create (or open and resize) the buffer `key` for `session_id`
    pub fn create(
        session_id: &str,
        key: &str,
        shape: &[usize],
        dtype: DType,
    ) -> HolodeckResult<Self> {
        let byte_len = byte_size(key, shape, dtype)?;
        let name = checked_name(session_id, key)?;

        let region = ShmRegion::create(&name, byte_len)
            .map_err(|e| HolodeckError::allocation(key, format!("{}: {}", name, e)))?;

        log::info!(
            "Shared buffer '{}': created {} {:?} ({} bytes)",
            name,
            dtype,
            shape,
            byte_len
        );

        Ok(Self {
            key: key.to_string(),
            shape: shape.to_vec(),
            dtype,
            byte_len,
            region,
        })
    }

    /// Attach to a buffer the other side already created
    ///
    /// Only the byte size is checked against `shape` and `dtype`; an attached
    /// buffer is never unlinked by this side.
    pub fn attach(
        session_id: &str,
        key: &str,
        shape: &[usize],
        dtype: DType,
    ) -> HolodeckResult<Self> {
        let byte_len = byte_size(key, shape, dtype)?;
        let name = checked_name(session_id, key)?;

        let region = ShmRegion::open(&name)
            .map_err(|e| HolodeckError::allocation(key, format!("{}: {}", name, e)))?;

        if region.size() < byte_len {
            return Err(HolodeckError::allocation(
                key,
                format!(
                    "{} holds {} bytes, {} {:?} needs {}",
                    name,
                    region.size(),
                    dtype,
                    shape,
                    byte_len
                ),
            ));
        }

        Ok(Self {
            key: key.to_string(),
            shape: shape.to_vec(),
            dtype,
            byte_len,
            region,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// OS name of the backing region
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.byte_len / self.dtype.size()
    }

    /// Always false: a buffer has at least one element
    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// True if this buffer already satisfies an allocation request
    pub fn matches(&self, shape: &[usize], dtype: DType) -> bool {
        self.shape == shape && self.dtype == dtype
    }

    /// Start of the mapped memory; stable for the buffer's lifetime
    pub fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.region.as_slice()[..self.byte_len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let byte_len = self.byte_len;
        &mut self.region.as_mut_slice()[..byte_len]
    }

    /// Zero-copy typed view over the buffer
    pub fn as_slice<T: Element>(&self) -> HolodeckResult<&[T]> {
        self.check_type::<T>()?;
        bytemuck::try_cast_slice(self.as_bytes()).map_err(|e| HolodeckError::view(&self.key, e))
    }

    /// Zero-copy mutable typed view over the buffer
    pub fn as_mut_slice<T: Element>(&mut self) -> HolodeckResult<&mut [T]> {
        self.check_type::<T>()?;
        let key = self.key.clone();
        bytemuck::try_cast_slice_mut(self.as_bytes_mut()).map_err(|e| HolodeckError::view(key, e))
    }

    /// Copy `values` into the buffer; `values` must cover every element
    pub fn write<T: Element>(&mut self, values: &[T]) -> HolodeckResult<()> {
        self.check_len(values.len())?;
        self.as_mut_slice::<T>()?.copy_from_slice(values);
        Ok(())
    }

    /// Copy the buffer into `out`; `out` must have room for every element
    pub fn read_into<T: Element>(&self, out: &mut [T]) -> HolodeckResult<()> {
        self.check_len(out.len())?;
        out.copy_from_slice(self.as_slice::<T>()?);
        Ok(())
    }

    pub fn to_vec<T: Element>(&self) -> HolodeckResult<Vec<T>> {
        Ok(self.as_slice::<T>()?.to_vec())
    }

    /// Row-major element offset of a multi-dimensional index
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        index
            .iter()
            .zip(&self.shape)
            .try_fold(0usize, |acc, (&i, &dim)| (i < dim).then(|| acc * dim + i))
    }

    /// Remove the backing region's OS name (creator side only)
    pub(crate) fn unlink(&mut self) -> std::io::Result<()> {
        self.region.unlink()
    }

    fn check_type<T: Element>(&self) -> HolodeckResult<()> {
        if T::accepts(self.dtype) {
            Ok(())
        } else {
            Err(HolodeckError::view(
                &self.key,
                format!("buffer holds {}, requested {}", self.dtype, T::DTYPE),
            ))
        }
    }

    fn check_len(&self, len: usize) -> HolodeckResult<()> {
        if len == self.len() {
            Ok(())
        } else {
            Err(HolodeckError::view(
                &self.key,
                format!("buffer holds {} elements, got {}", self.len(), len),
            ))
        }
    }
}

/// OS name of `key`, refusing components that cannot appear in it verbatim
fn checked_name(session_id: &str, key: &str) -> HolodeckResult<String> {
    check_component("session id", session_id)
        .and_then(|_| check_component("key", key))
        .map_err(|reason| HolodeckError::allocation(key, reason))?;
    Ok(memory_name(session_id, key))
}

/// Bytes needed for `shape` elements of `dtype`, rejecting degenerate shapes
pub fn byte_size(key: &str, shape: &[usize], dtype: DType) -> HolodeckResult<usize> {
    if shape.is_empty() {
        return Err(HolodeckError::allocation(key, "shape has no dimensions"));
    }
    if shape.contains(&0) {
        return Err(HolodeckError::allocation(
            key,
            format!("zero dimension in shape {:?}", shape),
        ));
    }

    shape
        .iter()
        .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            HolodeckError::allocation(key, format!("shape {:?} of {} overflows", shape, dtype))
        })
}
