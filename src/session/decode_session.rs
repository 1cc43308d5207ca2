use crate::backend::DecodeBackend;
use crate::backend::array_slice::{ArraySliceBackend, VideoContext};
use crate::backend::descriptor::BufferDescriptor;
use crate::backend::lock::ContextMutex;
use crate::backend::pool::{PoolDecoderDevice, PoolIndexedBackend};
use crate::foundation::core::{BackendKind, DecodedFrame, DecoderHandle, Surface};
use crate::foundation::error::HwDecodeResult;
use crate::frame::transaction::{TransactionOpts, run_frame};

/// Hardware decode session: the active backend plus transaction tuning.
///
/// The backend variant is fixed when the session is built. One frame transaction runs at a time,
/// on the calling thread.
pub struct DecodeSession {
    backend: Box<dyn DecodeBackend>,
    opts: TransactionOpts,
}

impl DecodeSession {
    /// Wrap an already constructed backend.
    pub fn new(backend: Box<dyn DecodeBackend>) -> Self {
        Self {
            backend,
            opts: TransactionOpts::default(),
        }
    }

    /// Session over a pool-indexed device decoding into `surfaces`.
    pub fn pool_indexed<D>(device: D, surfaces: Vec<Surface>) -> Self
    where
        D: PoolDecoderDevice + 'static,
    {
        Self::new(Box::new(PoolIndexedBackend::new(device, surfaces)))
    }

    /// Session over an array-slice video context. `mutex` is shared with every other user of
    /// the context; pass `None` when nothing else touches it.
    pub fn array_slice<C>(context: C, decoder: DecoderHandle, mutex: Option<ContextMutex>) -> Self
    where
        C: VideoContext + 'static,
    {
        Self::new(Box::new(ArraySliceBackend::new(context, decoder, mutex)))
    }

    /// Replace the transaction tuning.
    pub fn with_opts(mut self, opts: TransactionOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Transaction tuning in effect.
    pub fn opts(&self) -> &TransactionOpts {
        &self.opts
    }

    /// Which backend this session drives.
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Borrow the backend, e.g. to commit extra buffers from a codec callback.
    pub fn backend_mut(&mut self) -> &mut dyn DecodeBackend {
        self.backend.as_mut()
    }

    /// Pool index or array slice of the frame's surface, or `None` if it is not one of ours.
    pub fn try_surface_index(&self, frame: &DecodedFrame) -> Option<u32> {
        self.backend.surface_index(frame.surface)
    }

    /// Pool index or array slice of the frame's surface.
    ///
    /// # Panics
    ///
    /// Panics if the surface does not belong to this session. Frames must only ever target
    /// surfaces the session handed out.
    pub fn surface_index(&self, frame: &DecodedFrame) -> u32 {
        self.try_surface_index(frame).unwrap_or_else(|| {
            panic!(
                "surface {:#x} does not belong to this {:?} decode session",
                frame.surface.as_raw(),
                self.kind()
            )
        })
    }

    /// Decode one frame into `frame`'s surface.
    ///
    /// `picture_params` is always committed; `quant_matrix` only when non-empty. `commit_bs_si`
    /// fills the bitstream and slice-control slots. See [`run_frame`] for the failure rules.
    ///
    /// # Panics
    ///
    /// Panics if the surface does not belong to this session.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(backend = ?self.backend.kind(), surface = frame.surface.as_raw())
    )]
    pub fn decode_frame<F>(
        &mut self,
        frame: &DecodedFrame,
        picture_params: &[u8],
        quant_matrix: &[u8],
        commit_bs_si: F,
    ) -> HwDecodeResult<()>
    where
        F: FnOnce(
            &mut dyn DecodeBackend,
            &mut BufferDescriptor,
            &mut BufferDescriptor,
        ) -> HwDecodeResult<()>,
    {
        self.surface_index(frame);
        run_frame(
            self.backend.as_mut(),
            frame.surface,
            picture_params,
            quant_matrix,
            commit_bs_si,
            &self.opts,
        )
    }
}

impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("kind", &self.kind())
            .field("opts", &self.opts)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/decode_session.rs"]
mod tests;
