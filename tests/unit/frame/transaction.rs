use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::*;
use crate::backend::array_slice::ArraySliceBackend;
use crate::backend::lock::ContextMutex;
use crate::backend::sim::{SimCall, SimConfig, SimHandle, SimVideoContext};
use crate::foundation::core::{BackendKind, DecoderHandle, Hresult, Surface};

struct Rig {
    backend: ArraySliceBackend<SimVideoContext>,
    mutex: ContextMutex,
    log: SimHandle,
}

fn rig(cfg: SimConfig) -> Rig {
    let mutex = ContextMutex::new();
    let (context, log) = SimVideoContext::new(cfg);
    let context = context.with_lock_probe(mutex.clone());
    Rig {
        backend: ArraySliceBackend::new(context, DecoderHandle(3), Some(mutex.clone())),
        mutex,
        log,
    }
}

fn fast() -> TransactionOpts {
    TransactionOpts {
        busy_retry_delay_micros: 0,
        ..TransactionOpts::default()
    }
}

fn commit_bs_si(
    backend: &mut dyn DecodeBackend,
    bitstream: &mut BufferDescriptor,
    slice: &mut BufferDescriptor,
) -> HwDecodeResult<()> {
    commit_buffer(backend, bitstream, BufferType::Bitstream, &[0, 0, 1, 0x65], 0)?;
    commit_buffer(backend, slice, BufferType::SliceControl, &[9; 10], 99)
}

fn run(r: &mut Rig, qm: &[u8], opts: &TransactionOpts) -> HwDecodeResult<()> {
    run_frame(
        &mut r.backend,
        SimConfig::surface(1),
        &[1; 32],
        qm,
        commit_bs_si,
        opts,
    )
}

fn submitted_types(log: &SimHandle) -> Vec<u32> {
    let snap = log.snapshot();
    assert_eq!(snap.batches.len(), 1);
    snap.batches[0].iter().map(|b| b.buffer_type).collect()
}

#[test]
fn happy_path_without_quant_matrix_submits_three_buffers() {
    let mut r = rig(SimConfig::default());
    run(&mut r, &[], &fast()).unwrap();

    assert_eq!(
        submitted_types(&r.log),
        vec![
            BufferType::PictureParameters.as_raw(),
            BufferType::Bitstream.as_raw(),
            BufferType::SliceControl.as_raw(),
        ]
    );
    let snap = r.log.snapshot();
    assert_eq!(snap.batches[0][0].data_size, 32);
    assert_eq!(snap.batches[0][2].mb_count, 99);
    assert_eq!(snap.end_frames(), 1);
    assert!(snap.outstanding.is_empty());
    assert!(!r.mutex.is_locked());
}

#[test]
fn quant_matrix_goes_second() {
    let mut r = rig(SimConfig::default());
    run(&mut r, &[4; 64], &fast()).unwrap();

    assert_eq!(
        submitted_types(&r.log),
        vec![
            BufferType::PictureParameters.as_raw(),
            BufferType::InverseQuantizationMatrix.as_raw(),
            BufferType::Bitstream.as_raw(),
            BufferType::SliceControl.as_raw(),
        ]
    );
    assert_eq!(r.log.snapshot().batches[0][1].data_size, 64);
}

#[test]
fn busy_begin_retries_until_started() {
    let mut r = rig(SimConfig {
        busy_begins: 49,
        ..SimConfig::default()
    });
    run(&mut r, &[], &fast()).unwrap();

    let snap = r.log.snapshot();
    assert_eq!(snap.begin_attempts, 50);
    assert!(snap.locked_at_begin.iter().all(|l| *l));
    assert_eq!(snap.end_frames(), 1);
    assert!(!r.mutex.is_locked());
}

/// Delegates to `inner` and records the lock protocol around begin and end.
struct Traced<B> {
    inner: B,
    trace: Vec<&'static str>,
}

impl<B: DecodeBackend> DecodeBackend for Traced<B> {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn lock(&mut self) {
        self.trace.push("lock");
        self.inner.lock();
    }

    fn unlock(&mut self) {
        self.trace.push("unlock");
        self.inner.unlock();
    }

    fn begin_frame(&mut self, surface: Surface) -> BeginStatus {
        let status = self.inner.begin_frame(surface);
        self.trace.push(match status {
            BeginStatus::Started => "begin",
            BeginStatus::Busy => "busy",
            BeginStatus::Failed(_) => "failed",
        });
        status
    }

    fn get_buffer(&mut self, buffer_type: BufferType) -> Result<&mut [u8], Hresult> {
        self.inner.get_buffer(buffer_type)
    }

    fn release_buffer(&mut self, buffer_type: BufferType) -> Result<(), Hresult> {
        self.inner.release_buffer(buffer_type)
    }

    fn describe(&self, buffer_type: BufferType, data_size: u32, mb_count: u32)
    -> BufferDescriptor {
        self.inner.describe(buffer_type, data_size, mb_count)
    }

    fn submit(&mut self, buffers: &[BufferDescriptor]) -> Result<(), Hresult> {
        self.inner.submit(buffers)
    }

    fn end_frame(&mut self) -> Result<(), Hresult> {
        self.trace.push("end");
        self.inner.end_frame()
    }

    fn surface_index(&self, surface: Surface) -> Option<u32> {
        self.inner.surface_index(surface)
    }
}

#[test]
fn every_busy_attempt_unlocks_before_retrying() {
    let r = rig(SimConfig {
        busy_begins: 3,
        ..SimConfig::default()
    });
    let mut traced = Traced {
        inner: r.backend,
        trace: Vec::new(),
    };
    run_frame(
        &mut traced,
        SimConfig::surface(1),
        &[1; 32],
        &[],
        commit_bs_si,
        &fast(),
    )
    .unwrap();

    assert_eq!(
        traced.trace,
        vec![
            "lock", "busy", "unlock", //
            "lock", "busy", "unlock", //
            "lock", "busy", "unlock", //
            "lock", "begin", "end", "unlock",
        ]
    );
    assert!(!r.mutex.is_locked());
}

#[test]
fn context_is_free_while_waiting_out_busy() {
    let mut r = rig(SimConfig {
        busy_begins: 3,
        ..SimConfig::default()
    });
    let opts = TransactionOpts {
        max_begin_attempts: 50,
        busy_retry_delay_micros: 20_000,
    };

    let contender = r.mutex.clone();
    let decoding = AtomicBool::new(true);
    let grabs = std::thread::scope(|scope| {
        let watcher = scope.spawn(|| {
            let mut grabs = 0_u32;
            while decoding.load(Ordering::SeqCst) {
                if contender.try_lock().is_some() {
                    grabs += 1;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            grabs
        });
        run(&mut r, &[], &opts).unwrap();
        decoding.store(false, Ordering::SeqCst);
        watcher.join().unwrap()
    });

    assert!(grabs > 0);
    assert_eq!(r.log.snapshot().begin_attempts, 4);
    assert!(!r.mutex.is_locked());
}

#[test]
fn busy_for_every_attempt_aborts_before_active() {
    let mut r = rig(SimConfig {
        busy_begins: 1_000,
        ..SimConfig::default()
    });
    let err = run(&mut r, &[], &fast()).unwrap_err();

    assert!(matches!(err, HwDecodeError::BeginBusy { attempts: 50 }));
    let snap = r.log.snapshot();
    assert_eq!(snap.begin_attempts, 50);
    assert!(snap.locked_at_begin.iter().all(|l| *l));
    assert_eq!(snap.count(&SimCall::GetBuffer { buffer_type: 0 }), 0);
    assert!(snap.batches.is_empty());
    assert_eq!(snap.end_frames(), 0);
    assert!(!r.mutex.is_locked());
}

#[test]
fn busy_retries_sleep_between_attempts() {
    let mut r = rig(SimConfig {
        busy_begins: 1_000,
        ..SimConfig::default()
    });
    let opts = TransactionOpts {
        max_begin_attempts: 3,
        busy_retry_delay_micros: 2_000,
    };
    let start = Instant::now();
    let err = run(&mut r, &[], &opts).unwrap_err();

    assert!(matches!(err, HwDecodeError::BeginBusy { attempts: 3 }));
    assert!(start.elapsed() >= opts.busy_retry_delay() * 2);
    assert_eq!(r.log.snapshot().begin_attempts, 3);
}

#[test]
fn zero_attempt_budget_still_tries_once() {
    let mut r = rig(SimConfig {
        busy_begins: 1,
        ..SimConfig::default()
    });
    let opts = TransactionOpts {
        max_begin_attempts: 0,
        busy_retry_delay_micros: 0,
    };
    let err = run(&mut r, &[], &opts).unwrap_err();
    assert!(matches!(err, HwDecodeError::BeginBusy { attempts: 1 }));
}

#[test]
fn hard_begin_failure_does_not_end_frame() {
    let mut r = rig(SimConfig {
        begin_status: Hresult::E_FAIL,
        ..SimConfig::default()
    });
    let err = run(&mut r, &[], &fast()).unwrap_err();

    assert!(matches!(
        err,
        HwDecodeError::BeginFrame {
            status: Hresult::E_FAIL
        }
    ));
    let snap = r.log.snapshot();
    assert_eq!(snap.begin_attempts, 1);
    assert_eq!(snap.end_frames(), 0);
    assert!(!r.mutex.is_locked());
}

#[test]
fn submit_failure_still_ends_and_unlocks() {
    let mut r = rig(SimConfig {
        submit_status: Hresult::E_FAIL,
        ..SimConfig::default()
    });
    let err = run(&mut r, &[], &fast()).unwrap_err();

    assert!(matches!(err, HwDecodeError::Submit { .. }));
    assert_eq!(r.log.snapshot().end_frames(), 1);
    assert!(!r.mutex.is_locked());
}

#[test]
fn end_failure_after_success_fails_the_frame() {
    let mut r = rig(SimConfig {
        end_status: Hresult::E_FAIL,
        ..SimConfig::default()
    });
    let err = run(&mut r, &[], &fast()).unwrap_err();

    assert!(matches!(err, HwDecodeError::EndFrame { .. }));
    assert_eq!(r.log.snapshot().batches.len(), 1);
    assert!(!r.mutex.is_locked());
}

#[test]
fn end_failure_replaces_submit_failure() {
    let mut r = rig(SimConfig {
        submit_status: Hresult::E_INVALIDARG,
        end_status: Hresult::E_FAIL,
        ..SimConfig::default()
    });
    let err = run(&mut r, &[], &fast()).unwrap_err();
    assert!(matches!(
        err,
        HwDecodeError::EndFrame {
            status: Hresult::E_FAIL
        }
    ));
}

#[test]
fn picture_parameter_failure_skips_to_end() {
    let mut cfg = SimConfig::default();
    cfg.capacity_overrides.insert(BufferType::PictureParameters, 8);
    let mut r = rig(cfg);
    let mut callback_ran = false;

    let err = run_frame(
        &mut r.backend,
        SimConfig::surface(0),
        &[1; 32],
        &[4; 16],
        |_, _, _| {
            callback_ran = true;
            Ok(())
        },
        &fast(),
    )
    .unwrap_err();

    assert!(matches!(err, HwDecodeError::BufferTooSmall { .. }));
    assert!(!callback_ran);
    let snap = r.log.snapshot();
    assert_eq!(snap.count(&SimCall::GetBuffer { buffer_type: 4 }), 0);
    assert!(snap.batches.is_empty());
    assert!(snap.outstanding.is_empty());
    assert_eq!(snap.end_frames(), 1);
    assert!(!r.mutex.is_locked());
}

#[derive(Clone, Default)]
struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn line_with(&self, needle: &str) -> String {
        let text = String::from_utf8_lossy(&self.0.lock()).into_owned();
        text.lines()
            .find(|l| l.contains(needle))
            .unwrap_or_default()
            .to_owned()
    }
}

#[test]
fn commit_failure_logs_carry_the_error() {
    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut cfg = SimConfig::default();
        cfg.capacity_overrides.insert(BufferType::PictureParameters, 8);
        assert!(run(&mut rig(cfg), &[], &fast()).is_err());

        let mut r = rig(SimConfig {
            fail_get_buffer: Some(BufferType::InverseQuantizationMatrix),
            ..SimConfig::default()
        });
        assert!(run(&mut r, &[4; 16], &fast()).is_err());
    });

    let pp = logs.line_with("failed to add picture parameter buffer");
    assert!(pp.contains("err=buffer for picture parameters (0) was too small"), "{pp}");
    let qm = logs.line_with("failed to add inverse quantization matrix buffer");
    assert!(qm.contains("err=failed to get a buffer for"), "{qm}");
    assert!(qm.contains("0x80004005"), "{qm}");
}

#[test]
fn quant_matrix_failure_skips_callback_and_submit() {
    let mut r = rig(SimConfig {
        fail_get_buffer: Some(BufferType::InverseQuantizationMatrix),
        ..SimConfig::default()
    });
    let err = run(&mut r, &[4; 16], &fast()).unwrap_err();

    assert!(matches!(err, HwDecodeError::BufferAcquire { .. }));
    let snap = r.log.snapshot();
    assert_eq!(snap.count(&SimCall::GetBuffer { buffer_type: 6 }), 0);
    assert!(snap.batches.is_empty());
    assert_eq!(snap.end_frames(), 1);
}

#[test]
fn callback_failure_skips_submit() {
    let mut r = rig(SimConfig::default());
    let err = run_frame(
        &mut r.backend,
        SimConfig::surface(0),
        &[1; 8],
        &[],
        |_, _, _| Err(anyhow::anyhow!("slice table overflow").into()),
        &fast(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("slice table overflow"));
    let snap = r.log.snapshot();
    assert!(snap.batches.is_empty());
    assert_eq!(snap.end_frames(), 1);
    assert!(!r.mutex.is_locked());
}

#[test]
fn panicking_callback_still_ends_frame() {
    let mut r = rig(SimConfig::default());
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_frame(
            &mut r.backend,
            SimConfig::surface(0),
            &[1; 8],
            &[],
            |_, _, _| panic!("codec bug"),
            &fast(),
        )
    }));

    assert!(outcome.is_err());
    assert_eq!(r.log.snapshot().end_frames(), 1);
    assert!(!r.mutex.is_locked());
}

#[test]
fn consecutive_frames_reuse_the_backend() {
    let mut r = rig(SimConfig {
        busy_begins: 2,
        ..SimConfig::default()
    });
    run(&mut r, &[], &fast()).unwrap();
    run(&mut r, &[7; 4], &fast()).unwrap();

    let snap = r.log.snapshot();
    assert_eq!(snap.begin_attempts, 6);
    assert_eq!(snap.batches.len(), 2);
    assert_eq!(snap.end_frames(), 2);
}

#[test]
fn opts_defaults_and_json() {
    let d = TransactionOpts::default();
    assert_eq!(d.max_begin_attempts, 50);
    assert_eq!(d.busy_retry_delay(), Duration::from_millis(2));

    let o: TransactionOpts = serde_json::from_str(r#"{"max_begin_attempts":5}"#).unwrap();
    assert_eq!(o.max_begin_attempts, 5);
    assert_eq!(o.busy_retry_delay_micros, 2_000);
}
