use smallvec::SmallVec;

use crate::backend::descriptor::{BufferDescriptor, Dxva2BufferDesc, MAX_FRAME_BUFFERS};
use crate::backend::{BeginStatus, DecodeBackend};
use crate::foundation::core::{BackendKind, BufferType, Hresult, Surface};

/// Native decoder device of the pool-indexed backend.
///
/// Buffer types are passed as raw wire codes; every call reports a raw status code.
pub trait PoolDecoderDevice {
    /// Start decoding into `surface`.
    fn begin_frame(&mut self, surface: Surface) -> Hresult;
    /// Borrow the slot for `buffer_type`.
    fn get_buffer(&mut self, buffer_type: u32) -> Result<&mut [u8], Hresult>;
    /// Return the slot for `buffer_type`.
    fn release_buffer(&mut self, buffer_type: u32) -> Hresult;
    /// Execute the committed buffers.
    fn execute(&mut self, buffers: &[Dxva2BufferDesc]) -> Hresult;
    /// Finish the frame.
    fn end_frame(&mut self) -> Hresult;
}

/// Backend whose surfaces are addressed by index into a fixed pool.
///
/// Nothing else drives the device concurrently, so locking is a no-op.
pub struct PoolIndexedBackend<D> {
    device: D,
    surfaces: Vec<Surface>,
}

impl<D: PoolDecoderDevice> PoolIndexedBackend<D> {
    /// Wrap `device`; `surfaces` is the fixed pool frames decode into, in index order.
    pub fn new(device: D, surfaces: Vec<Surface>) -> Self {
        Self { device, surfaces }
    }

    /// Surfaces in pool order.
    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    /// Borrow the native device.
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: PoolDecoderDevice> DecodeBackend for PoolIndexedBackend<D> {
    fn kind(&self) -> BackendKind {
        BackendKind::PoolIndexed
    }

    fn lock(&mut self) {}

    fn unlock(&mut self) {}

    fn begin_frame(&mut self, surface: Surface) -> BeginStatus {
        BeginStatus::from_hresult(self.device.begin_frame(surface))
    }

    fn get_buffer(&mut self, buffer_type: BufferType) -> Result<&mut [u8], Hresult> {
        self.device.get_buffer(buffer_type.as_raw())
    }

    fn release_buffer(&mut self, buffer_type: BufferType) -> Result<(), Hresult> {
        self.device.release_buffer(buffer_type.as_raw()).to_result()
    }

    fn describe(
        &self,
        buffer_type: BufferType,
        data_size: u32,
        mb_count: u32,
    ) -> BufferDescriptor {
        BufferDescriptor::pool(buffer_type, data_size, mb_count)
    }

    fn submit(&mut self, buffers: &[BufferDescriptor]) -> Result<(), Hresult> {
        let native = buffers
            .iter()
            .map(|d| match d {
                BufferDescriptor::Pool(desc) => Ok(*desc),
                BufferDescriptor::Slice(_) => Err(Hresult::E_INVALIDARG),
            })
            .collect::<Result<SmallVec<[Dxva2BufferDesc; MAX_FRAME_BUFFERS]>, _>>()?;
        self.device.execute(&native).to_result()
    }

    fn end_frame(&mut self) -> Result<(), Hresult> {
        self.device.end_frame().to_result()
    }

    fn surface_index(&self, surface: Surface) -> Option<u32> {
        self.surfaces
            .iter()
            .position(|s| *s == surface)
            .map(|i| i as u32)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/pool.rs"]
mod tests;
