use std::time::Duration;

use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::backend::descriptor::{BufferDescriptor, MAX_FRAME_BUFFERS};
use crate::backend::{BeginStatus, DecodeBackend};
use crate::foundation::core::{BufferType, Surface};
use crate::foundation::error::{HwDecodeError, HwDecodeResult};
use crate::frame::commit::commit_buffer;

/// Ordered descriptors submitted for one frame.
pub type DescriptorBatch = SmallVec<[BufferDescriptor; MAX_FRAME_BUFFERS]>;

/// Tuning for a frame transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TransactionOpts {
    /// Total begin-frame calls allowed while the backend reports busy. Zero behaves like one.
    pub max_begin_attempts: u32,
    /// Sleep between busy begin-frame attempts, in microseconds. The lock is dropped meanwhile.
    pub busy_retry_delay_micros: u64,
}

impl Default for TransactionOpts {
    fn default() -> Self {
        Self {
            max_begin_attempts: 50,
            busy_retry_delay_micros: 2_000,
        }
    }
}

impl TransactionOpts {
    /// Sleep between busy begin-frame attempts.
    pub fn busy_retry_delay(&self) -> Duration {
        Duration::from_micros(self.busy_retry_delay_micros)
    }
}

/// An open frame: begin-frame succeeded and the lock is held.
///
/// [`ActiveFrame::finish`] ends the frame and unlocks. If the frame is dropped without finishing
/// (a codec callback panicked), `Drop` does the same.
pub(crate) struct ActiveFrame<'a> {
    backend: &'a mut dyn DecodeBackend,
    open: bool,
}

impl<'a> ActiveFrame<'a> {
    /// Lock and begin a frame on `surface`, retrying while the backend is busy.
    ///
    /// On failure the lock is released and no frame is open.
    pub(crate) fn begin(
        backend: &'a mut dyn DecodeBackend,
        surface: Surface,
        opts: &TransactionOpts,
    ) -> HwDecodeResult<Self> {
        let max_attempts = opts.max_begin_attempts.max(1);
        let mut attempts = 0;
        loop {
            backend.lock();
            attempts += 1;
            match backend.begin_frame(surface) {
                BeginStatus::Started => {
                    return Ok(Self {
                        backend,
                        open: true,
                    });
                }
                BeginStatus::Busy if attempts < max_attempts => {
                    backend.unlock();
                    debug!(attempt = attempts, "decoder busy, retrying begin frame");
                    std::thread::sleep(opts.busy_retry_delay());
                }
                BeginStatus::Busy => {
                    backend.unlock();
                    error!(attempts, "failed to begin frame: decoder still busy");
                    return Err(HwDecodeError::BeginBusy { attempts });
                }
                BeginStatus::Failed(status) => {
                    backend.unlock();
                    error!(%status, attempt = attempts, "failed to begin frame");
                    return Err(HwDecodeError::BeginFrame { status });
                }
            }
        }
    }

    /// Commit every buffer of the frame in order and submit the batch.
    ///
    /// `commit_bs_si` is the per-codec callback that fills the bitstream and slice-control slots,
    /// usually through [`commit_buffer`]. Stops at the first failure; the caller still has to
    /// [`ActiveFrame::finish`].
    pub(crate) fn assemble_and_submit<F>(
        &mut self,
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
        let backend = &mut *self.backend;
        let mut batch = DescriptorBatch::new();

        let mut pp = backend.describe(BufferType::PictureParameters, 0, 0);
        commit_buffer(
            backend,
            &mut pp,
            BufferType::PictureParameters,
            picture_params,
            0,
        )
        .inspect_err(|err| {
            error!(
                phase = "picture_parameters",
                %err,
                "failed to add picture parameter buffer"
            )
        })?;
        batch.push(pp);

        if !quant_matrix.is_empty() {
            let mut qm = backend.describe(BufferType::InverseQuantizationMatrix, 0, 0);
            commit_buffer(
                backend,
                &mut qm,
                BufferType::InverseQuantizationMatrix,
                quant_matrix,
                0,
            )
            .inspect_err(|err| {
                error!(
                    phase = "quant_matrix",
                    %err,
                    "failed to add inverse quantization matrix buffer"
                )
            })?;
            batch.push(qm);
        }

        let mut bitstream = backend.describe(BufferType::Bitstream, 0, 0);
        let mut slice = backend.describe(BufferType::SliceControl, 0, 0);
        commit_bs_si(&mut *backend, &mut bitstream, &mut slice).inspect_err(|err| {
            error!(
                phase = "bitstream",
                %err,
                "failed to add bitstream or slice control buffer"
            )
        })?;
        batch.push(bitstream);
        batch.push(slice);

        debug_assert_eq!(batch.len(), 3 + usize::from(!quant_matrix.is_empty()));

        backend.submit(&batch).map_err(|status| {
            error!(phase = "submit", %status, "failed to execute");
            HwDecodeError::Submit { status }
        })
    }

    /// End the frame and release the lock.
    pub(crate) fn finish(mut self) -> HwDecodeResult<()> {
        self.close()
    }

    fn close(&mut self) -> HwDecodeResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let ended = self.backend.end_frame();
        self.backend.unlock();
        ended.map_err(|status| {
            error!(phase = "end", %status, "failed to end frame");
            HwDecodeError::EndFrame { status }
        })
    }
}

impl Drop for ActiveFrame<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("frame dropped while open, ending it");
            let _ = self.close();
        }
    }
}

/// Run one complete frame transaction on `backend`.
///
/// Begin (with busy retries), commit picture parameters, the optional quantization matrix and the
/// codec's bitstream/slice-control buffers, submit, then end the frame and unlock. Once begin
/// succeeded, end-frame and unlock run on every path. The returned error is the one from the last
/// phase that failed: an end-frame failure replaces an earlier one.
pub fn run_frame<F>(
    backend: &mut dyn DecodeBackend,
    surface: Surface,
    picture_params: &[u8],
    quant_matrix: &[u8],
    commit_bs_si: F,
    opts: &TransactionOpts,
) -> HwDecodeResult<()>
where
    F: FnOnce(
        &mut dyn DecodeBackend,
        &mut BufferDescriptor,
        &mut BufferDescriptor,
    ) -> HwDecodeResult<()>,
{
    let mut frame = ActiveFrame::begin(backend, surface, opts)?;
    let mut result = frame.assemble_and_submit(picture_params, quant_matrix, commit_bs_si);
    if let Err(err) = frame.finish() {
        result = Err(err);
    }
    result
}

#[cfg(test)]
#[path = "../../tests/unit/frame/transaction.rs"]
mod tests;
