//! hwdec coordinates hardware-accelerated video frame decode transactions.
//!
//! A [`DecodeSession`] wraps one of two decode backends and runs one frame at a time:
//!
//! - lock the backend and begin the frame, retrying while the decoder reports busy
//! - commit picture parameters, the optional quantization matrix, then let the codec commit its
//!   bitstream and slice-control buffers
//! - submit the ordered descriptor batch and always end the frame and unlock
//!
//! The native APIs sit behind [`PoolDecoderDevice`] and [`VideoContext`]; [`backend::sim`] has
//! in-memory implementations of both.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Backend adapters and native driver traits.
pub mod backend;
/// Buffer commits and the frame transaction.
pub mod frame;
/// Session-level API.
pub mod session;

pub use crate::foundation::core::{
    BackendKind, BufferType, DecodedFrame, DecoderHandle, Hresult, Surface,
};
pub use crate::foundation::error::{HwDecodeError, HwDecodeResult};

pub use crate::backend::array_slice::{ArraySliceBackend, VideoContext};
pub use crate::backend::descriptor::{BufferDescriptor, D3d11BufferDesc, Dxva2BufferDesc};
pub use crate::backend::lock::{ContextMutex, ContextMutexGuard};
pub use crate::backend::pool::{PoolDecoderDevice, PoolIndexedBackend};
pub use crate::backend::{BeginStatus, DecodeBackend};
pub use crate::frame::commit::commit_buffer;
pub use crate::frame::transaction::{DescriptorBatch, TransactionOpts, run_frame};
pub use crate::session::decode_session::DecodeSession;
