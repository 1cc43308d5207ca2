//! Decode backend adapters.
//!
//! [`DecodeBackend`] is the one interface the frame transaction talks to. Two adapters implement
//! it on top of the native driver traits:
//!
//! - [`pool::PoolIndexedBackend`] addresses surfaces by index into a fixed pool and needs no lock.
//! - [`array_slice::ArraySliceBackend`] addresses surfaces by texture-array slice and serializes
//!   access through an optional [`lock::ContextMutex`].

/// Array-slice backend adapter and its video-context driver trait.
pub mod array_slice;
/// Backend-specific buffer descriptor layouts.
pub mod descriptor;
/// Cross-thread exclusivity lock shared with other users of the decoder context.
pub mod lock;
/// Pool-indexed backend adapter and its decoder-device driver trait.
pub mod pool;
/// Software drivers for tests and the `hwdec` binary.
pub mod sim;

use crate::backend::descriptor::BufferDescriptor;
use crate::foundation::core::{BackendKind, BufferType, Hresult, Surface};

/// Outcome of a begin-frame call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeginStatus {
    /// The frame is open.
    Started,
    /// The pipeline is still draining; retry later.
    Busy,
    /// Hard failure.
    Failed(Hresult),
}

impl BeginStatus {
    /// Classify a native begin-frame status code.
    pub fn from_hresult(hr: Hresult) -> Self {
        if hr == Hresult::E_PENDING {
            Self::Busy
        } else if hr.failed() {
            Self::Failed(hr)
        } else {
            Self::Started
        }
    }
}

/// Backend operations a frame transaction is built from.
///
/// Buffer slots returned by [`DecodeBackend::get_buffer`] belong to the backend and are only valid
/// until the matching [`DecodeBackend::release_buffer`].
pub trait DecodeBackend {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Take the cross-thread lock, waiting as long as it takes. No-op without one.
    fn lock(&mut self);

    /// Release the lock taken by [`DecodeBackend::lock`]. No-op when not held.
    fn unlock(&mut self);

    /// Start a decode transaction targeting `surface`.
    fn begin_frame(&mut self, surface: Surface) -> BeginStatus;

    /// Borrow a writable slot for `buffer_type`. The slot length is its capacity.
    fn get_buffer(&mut self, buffer_type: BufferType) -> Result<&mut [u8], Hresult>;

    /// Hand the slot for `buffer_type` back to the backend.
    fn release_buffer(&mut self, buffer_type: BufferType) -> Result<(), Hresult>;

    /// Build a zeroed descriptor in this backend's layout.
    fn describe(&self, buffer_type: BufferType, data_size: u32, mb_count: u32)
    -> BufferDescriptor;

    /// Execute the ordered descriptor batch.
    fn submit(&mut self, buffers: &[BufferDescriptor]) -> Result<(), Hresult>;

    /// Close the decode transaction.
    fn end_frame(&mut self) -> Result<(), Hresult>;

    /// Index of `surface` in this backend's pool or texture array.
    fn surface_index(&self, surface: Surface) -> Option<u32>;
}
