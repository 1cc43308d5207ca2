//! Software decode drivers.
//!
//! [`SimPoolDecoder`] and [`SimVideoContext`] implement the two native driver traits in memory.
//! Their behavior is scripted by [`SimConfig`] and every call lands in a shared [`SimLog`] that the
//! caller reads through a [`SimHandle`] after handing the driver to a session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::array_slice::VideoContext;
use crate::backend::descriptor::{D3d11BufferDesc, Dxva2BufferDesc};
use crate::backend::lock::ContextMutex;
use crate::backend::pool::PoolDecoderDevice;
use crate::foundation::core::{BufferType, DecoderHandle, Hresult, Surface};

/// Byte every slot is filled with when handed out.
pub const SLOT_FILL: u8 = 0xCD;

const SURFACE_BASE: u64 = 0x1000;
const SURFACE_STRIDE: u64 = 0x10;

/// Scripted behavior of a simulated driver.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of decode surfaces (pool entries or array slices).
    pub surface_count: u32,
    /// Begin-frame calls per frame that report busy before the frame can start.
    pub busy_begins: u32,
    /// Status reported once the frame is no longer busy.
    pub begin_status: Hresult,
    /// Slot capacity in bytes for every buffer type without an override.
    pub buffer_capacity: u32,
    /// Per-type slot capacities.
    pub capacity_overrides: BTreeMap<BufferType, u32>,
    /// Buffer type whose slot cannot be obtained.
    pub fail_get_buffer: Option<BufferType>,
    /// Buffer type whose slot release fails.
    pub fail_release: Option<BufferType>,
    /// Status reported by submit.
    pub submit_status: Hresult,
    /// Status reported by end-frame.
    pub end_status: Hresult,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            surface_count: 4,
            busy_begins: 0,
            begin_status: Hresult::S_OK,
            buffer_capacity: 64 * 1024,
            capacity_overrides: BTreeMap::new(),
            fail_get_buffer: None,
            fail_release: None,
            submit_status: Hresult::S_OK,
            end_status: Hresult::S_OK,
        }
    }
}

impl SimConfig {
    /// Surface handle at `index`.
    pub fn surface(index: u32) -> Surface {
        Surface::from_raw(SURFACE_BASE + u64::from(index) * SURFACE_STRIDE)
    }

    /// All simulated surfaces in index order.
    pub fn surfaces(&self) -> Vec<Surface> {
        (0..self.surface_count).map(Self::surface).collect()
    }

    fn capacity(&self, buffer_type: u32) -> usize {
        BufferType::from_raw(buffer_type)
            .and_then(|t| self.capacity_overrides.get(&t).copied())
            .unwrap_or(self.buffer_capacity) as usize
    }

    fn index_of(&self, surface: Surface) -> Option<u32> {
        let offset = surface.as_raw().checked_sub(SURFACE_BASE)?;
        if offset % SURFACE_STRIDE != 0 {
            return None;
        }
        let index = u32::try_from(offset / SURFACE_STRIDE).ok()?;
        (index < self.surface_count).then_some(index)
    }

    fn fails(selected: Option<BufferType>, buffer_type: u32) -> bool {
        selected.is_some_and(|t| t.as_raw() == buffer_type)
    }
}

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SimCall {
    /// Begin-frame against a surface.
    BeginFrame {
        /// Raw surface handle.
        surface: u64,
    },
    /// Slot acquisition.
    GetBuffer {
        /// Buffer type wire code.
        buffer_type: u32,
    },
    /// Slot release.
    ReleaseBuffer {
        /// Buffer type wire code.
        buffer_type: u32,
    },
    /// Batch submission.
    Submit {
        /// Number of descriptors in the batch.
        count: usize,
    },
    /// End-frame.
    EndFrame,
}

/// Descriptor fields as the driver received them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SubmittedBuffer {
    /// Buffer type wire code.
    pub buffer_type: u32,
    /// Payload size in bytes.
    pub data_size: u32,
    /// Macroblock count.
    pub mb_count: u32,
}

/// Everything a simulated driver observed.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct SimLog {
    /// Calls in order.
    pub calls: Vec<SimCall>,
    /// Total begin-frame calls, busy ones included.
    pub begin_attempts: u32,
    /// Whether the lock probe was held at each begin-frame call.
    pub locked_at_begin: Vec<bool>,
    /// Slots handed out and not yet released.
    pub outstanding: BTreeSet<u32>,
    /// Slot contents at their most recent release, by buffer type.
    pub released: BTreeMap<u32, Vec<u8>>,
    /// Submitted batches in order.
    pub batches: Vec<Vec<SubmittedBuffer>>,
}

impl SimLog {
    /// Number of recorded calls matching `call`.
    pub fn count(&self, call: &SimCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Number of end-frame calls.
    pub fn end_frames(&self) -> usize {
        self.count(&SimCall::EndFrame)
    }
}

/// Shared view of a simulated driver's [`SimLog`].
#[derive(Clone, Debug, Default)]
pub struct SimHandle(Arc<Mutex<SimLog>>);

impl SimHandle {
    /// Copy of the log as it stands.
    pub fn snapshot(&self) -> SimLog {
        self.0.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        *self.0.lock() = SimLog::default();
    }

    fn record(&self, call: SimCall) {
        self.0.lock().calls.push(call);
    }
}

struct SimCore {
    cfg: SimConfig,
    log: SimHandle,
    slots: BTreeMap<u32, Vec<u8>>,
    busy_left: u32,
    in_frame: bool,
    lock_probe: Option<ContextMutex>,
}

impl SimCore {
    fn new(cfg: SimConfig) -> (Self, SimHandle) {
        let log = SimHandle::default();
        let core = Self {
            busy_left: cfg.busy_begins,
            cfg,
            log: log.clone(),
            slots: BTreeMap::new(),
            in_frame: false,
            lock_probe: None,
        };
        (core, log)
    }

    fn begin_frame(&mut self, surface: Surface) -> Hresult {
        {
            let mut log = self.log.0.lock();
            log.calls.push(SimCall::BeginFrame {
                surface: surface.as_raw(),
            });
            log.begin_attempts += 1;
            let locked = self.lock_probe.as_ref().is_some_and(ContextMutex::is_locked);
            log.locked_at_begin.push(locked);
        }

        if self.in_frame || self.cfg.index_of(surface).is_none() {
            return Hresult::E_INVALIDARG;
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            return Hresult::E_PENDING;
        }
        if self.cfg.begin_status.failed() {
            return self.cfg.begin_status;
        }
        self.in_frame = true;
        self.cfg.begin_status
    }

    fn get_buffer(&mut self, buffer_type: u32) -> Result<&mut [u8], Hresult> {
        {
            let mut log = self.log.0.lock();
            log.calls.push(SimCall::GetBuffer { buffer_type });
            if !self.in_frame
                || log.outstanding.contains(&buffer_type)
                || SimConfig::fails(self.cfg.fail_get_buffer, buffer_type)
            {
                return Err(Hresult::E_FAIL);
            }
            log.outstanding.insert(buffer_type);
        }

        let capacity = self.cfg.capacity(buffer_type);
        let slot = self.slots.entry(buffer_type).or_default();
        slot.clear();
        slot.resize(capacity, SLOT_FILL);
        Ok(slot.as_mut_slice())
    }

    fn release_buffer(&mut self, buffer_type: u32) -> Hresult {
        let mut log = self.log.0.lock();
        log.calls.push(SimCall::ReleaseBuffer { buffer_type });
        if !log.outstanding.remove(&buffer_type) {
            return Hresult::E_INVALIDARG;
        }
        let contents = self.slots.get(&buffer_type).cloned().unwrap_or_default();
        log.released.insert(buffer_type, contents);
        if SimConfig::fails(self.cfg.fail_release, buffer_type) {
            return Hresult::E_FAIL;
        }
        Hresult::S_OK
    }

    fn submit(&mut self, batch: Vec<SubmittedBuffer>) -> Hresult {
        let mut log = self.log.0.lock();
        log.calls.push(SimCall::Submit { count: batch.len() });
        let in_bounds = batch.iter().all(|b| {
            log.released
                .get(&b.buffer_type)
                .is_some_and(|c| b.data_size as usize <= c.len())
        });
        log.batches.push(batch);
        if !self.in_frame || !in_bounds || !log.outstanding.is_empty() {
            return Hresult::E_INVALIDARG;
        }
        self.cfg.submit_status
    }

    fn end_frame(&mut self) -> Hresult {
        self.log.record(SimCall::EndFrame);
        if !self.in_frame {
            return Hresult::E_FAIL;
        }
        self.in_frame = false;
        self.busy_left = self.cfg.busy_begins;
        self.cfg.end_status
    }
}

/// In-memory [`PoolDecoderDevice`].
pub struct SimPoolDecoder {
    core: SimCore,
}

impl SimPoolDecoder {
    /// Create a device and the handle to its log.
    pub fn new(cfg: SimConfig) -> (Self, SimHandle) {
        let (core, log) = SimCore::new(cfg);
        (Self { core }, log)
    }

    /// The surface pool this device decodes into.
    pub fn surfaces(&self) -> Vec<Surface> {
        self.core.cfg.surfaces()
    }
}

impl PoolDecoderDevice for SimPoolDecoder {
    fn begin_frame(&mut self, surface: Surface) -> Hresult {
        self.core.begin_frame(surface)
    }

    fn get_buffer(&mut self, buffer_type: u32) -> Result<&mut [u8], Hresult> {
        self.core.get_buffer(buffer_type)
    }

    fn release_buffer(&mut self, buffer_type: u32) -> Hresult {
        self.core.release_buffer(buffer_type)
    }

    fn execute(&mut self, buffers: &[Dxva2BufferDesc]) -> Hresult {
        let batch = buffers
            .iter()
            .map(|d| SubmittedBuffer {
                buffer_type: d.compressed_buffer_type,
                data_size: d.data_size,
                mb_count: d.num_mbs_in_buffer,
            })
            .collect();
        self.core.submit(batch)
    }

    fn end_frame(&mut self) -> Hresult {
        self.core.end_frame()
    }
}

/// In-memory [`VideoContext`]. View `i` covers array slice `i`.
pub struct SimVideoContext {
    core: SimCore,
}

impl SimVideoContext {
    /// Create a context and the handle to its log.
    pub fn new(cfg: SimConfig) -> (Self, SimHandle) {
        let (core, log) = SimCore::new(cfg);
        (Self { core }, log)
    }

    /// Record whether `mutex` is held at every begin-frame call.
    pub fn with_lock_probe(mut self, mutex: ContextMutex) -> Self {
        self.core.lock_probe = Some(mutex);
        self
    }

    /// Output views in array-slice order.
    pub fn views(&self) -> Vec<Surface> {
        self.core.cfg.surfaces()
    }
}

impl VideoContext for SimVideoContext {
    fn decoder_begin_frame(&mut self, _decoder: DecoderHandle, view: Surface) -> Hresult {
        self.core.begin_frame(view)
    }

    fn get_decoder_buffer(
        &mut self,
        _decoder: DecoderHandle,
        buffer_type: u32,
    ) -> Result<&mut [u8], Hresult> {
        self.core.get_buffer(buffer_type)
    }

    fn release_decoder_buffer(&mut self, _decoder: DecoderHandle, buffer_type: u32) -> Hresult {
        self.core.release_buffer(buffer_type)
    }

    fn submit_decoder_buffers(
        &mut self,
        _decoder: DecoderHandle,
        buffers: &[D3d11BufferDesc],
    ) -> Hresult {
        let batch = buffers
            .iter()
            .map(|d| SubmittedBuffer {
                buffer_type: d.buffer_type,
                data_size: d.data_size,
                mb_count: d.num_mbs_in_buffer,
            })
            .collect();
        self.core.submit(batch)
    }

    fn decoder_end_frame(&mut self, _decoder: DecoderHandle) -> Hresult {
        self.core.end_frame()
    }

    fn output_view_array_slice(&self, view: Surface) -> Option<u32> {
        self.core.cfg.index_of(view)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/sim.rs"]
mod tests;
