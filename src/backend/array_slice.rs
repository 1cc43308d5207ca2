use smallvec::SmallVec;

use crate::backend::descriptor::{BufferDescriptor, D3d11BufferDesc, MAX_FRAME_BUFFERS};
use crate::backend::lock::{ContextMutex, ContextMutexGuard};
use crate::backend::{BeginStatus, DecodeBackend};
use crate::foundation::core::{BackendKind, BufferType, DecoderHandle, Hresult, Surface};

/// Native video context of the array-slice backend.
///
/// Surfaces are decoder output views; each view knows which texture-array slice it covers.
pub trait VideoContext {
    /// Start decoding into the output view `view`.
    fn decoder_begin_frame(&mut self, decoder: DecoderHandle, view: Surface) -> Hresult;
    /// Borrow the slot for `buffer_type`.
    fn get_decoder_buffer(
        &mut self,
        decoder: DecoderHandle,
        buffer_type: u32,
    ) -> Result<&mut [u8], Hresult>;
    /// Return the slot for `buffer_type`.
    fn release_decoder_buffer(&mut self, decoder: DecoderHandle, buffer_type: u32) -> Hresult;
    /// Execute the committed buffers.
    fn submit_decoder_buffers(
        &mut self,
        decoder: DecoderHandle,
        buffers: &[D3d11BufferDesc],
    ) -> Hresult;
    /// Finish the frame.
    fn decoder_end_frame(&mut self, decoder: DecoderHandle) -> Hresult;
    /// Texture-array slice described by the view, or `None` for a view this context never made.
    fn output_view_array_slice(&self, view: Surface) -> Option<u32>;
}

/// Backend whose surfaces are texture-array slices.
///
/// Other threads may use the same context, so every frame transaction runs under the optional
/// [`ContextMutex`].
pub struct ArraySliceBackend<C> {
    context: C,
    decoder: DecoderHandle,
    mutex: Option<ContextMutex>,
    held: Option<ContextMutexGuard>,
}

impl<C: VideoContext> ArraySliceBackend<C> {
    /// Wrap `context` and `decoder`. Without a mutex, locking is skipped.
    pub fn new(context: C, decoder: DecoderHandle, mutex: Option<ContextMutex>) -> Self {
        Self {
            context,
            decoder,
            mutex,
            held: None,
        }
    }

    /// The shared context mutex, if any.
    pub fn mutex(&self) -> Option<&ContextMutex> {
        self.mutex.as_ref()
    }

    /// Borrow the native video context.
    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C: VideoContext> DecodeBackend for ArraySliceBackend<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::ArraySlice
    }

    fn lock(&mut self) {
        if self.held.is_none() {
            self.held = self.mutex.as_ref().map(ContextMutex::lock);
        }
    }

    fn unlock(&mut self) {
        self.held = None;
    }

    fn begin_frame(&mut self, surface: Surface) -> BeginStatus {
        BeginStatus::from_hresult(self.context.decoder_begin_frame(self.decoder, surface))
    }

    fn get_buffer(&mut self, buffer_type: BufferType) -> Result<&mut [u8], Hresult> {
        self.context
            .get_decoder_buffer(self.decoder, buffer_type.as_raw())
    }

    fn release_buffer(&mut self, buffer_type: BufferType) -> Result<(), Hresult> {
        self.context
            .release_decoder_buffer(self.decoder, buffer_type.as_raw())
            .to_result()
    }

    fn describe(
        &self,
        buffer_type: BufferType,
        data_size: u32,
        mb_count: u32,
    ) -> BufferDescriptor {
        BufferDescriptor::slice(buffer_type, data_size, mb_count)
    }

    fn submit(&mut self, buffers: &[BufferDescriptor]) -> Result<(), Hresult> {
        let native = buffers
            .iter()
            .map(|d| match d {
                BufferDescriptor::Slice(desc) => Ok(*desc),
                BufferDescriptor::Pool(_) => Err(Hresult::E_INVALIDARG),
            })
            .collect::<Result<SmallVec<[D3d11BufferDesc; MAX_FRAME_BUFFERS]>, _>>()?;
        self.context
            .submit_decoder_buffers(self.decoder, &native)
            .to_result()
    }

    fn end_frame(&mut self) -> Result<(), Hresult> {
        self.context.decoder_end_frame(self.decoder).to_result()
    }

    fn surface_index(&self, surface: Surface) -> Option<u32> {
        self.context.output_view_array_slice(surface)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/array_slice.rs"]
mod tests;
