use tracing::error;

use crate::backend::DecodeBackend;
use crate::backend::descriptor::BufferDescriptor;
use crate::foundation::core::BufferType;
use crate::foundation::error::{HwDecodeError, HwDecodeResult};

/// Copy `payload` into the backend slot for `buffer_type` and describe it in `desc`.
///
/// The slot is always released once it was obtained, even when the payload does not fit. A failed
/// release turns an otherwise successful commit into an error. `desc` is only written on success.
pub fn commit_buffer(
    backend: &mut dyn DecodeBackend,
    desc: &mut BufferDescriptor,
    buffer_type: BufferType,
    payload: &[u8],
    mb_count: u32,
) -> HwDecodeResult<()> {
    let slot = backend.get_buffer(buffer_type).map_err(|status| {
        error!(%buffer_type, %status, "failed to get a buffer");
        HwDecodeError::BufferAcquire {
            buffer_type,
            status,
        }
    })?;

    let mut result = checked_size(buffer_type, payload.len(), slot.len());
    if result.is_ok() {
        slot[..payload.len()].copy_from_slice(payload);
    }

    if let Err(status) = backend.release_buffer(buffer_type) {
        error!(%buffer_type, %status, "failed to release buffer");
        result = Err(HwDecodeError::BufferRelease {
            buffer_type,
            status,
        });
    }

    let size = result?;
    *desc = backend.describe(buffer_type, size, mb_count);
    Ok(())
}

/// Size field for a payload of `size` bytes going into a slot of `capacity` bytes.
fn checked_size(buffer_type: BufferType, size: usize, capacity: usize) -> HwDecodeResult<u32> {
    if size > capacity {
        error!(%buffer_type, size, capacity, "buffer was too small");
        return Err(HwDecodeError::BufferTooSmall {
            buffer_type,
            size,
            capacity,
        });
    }
    u32::try_from(size).map_err(|_| {
        error!(%buffer_type, size, "payload too large for a buffer descriptor");
        HwDecodeError::PayloadTooLarge { buffer_type, size }
    })
}

#[cfg(test)]
#[path = "../../tests/unit/frame/commit.rs"]
mod tests;
