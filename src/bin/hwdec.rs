use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hwdec::backend::sim::{SimConfig, SimHandle, SimPoolDecoder, SimVideoContext};
use hwdec::{
    BackendKind, BufferType, ContextMutex, DecodeSession, DecodedFrame, DecoderHandle,
    TransactionOpts, commit_buffer,
};

#[derive(Parser, Debug)]
#[command(name = "hwdec", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario of frame transactions against the simulated backend.
    Simulate(SimulateArgs),
    /// Print the default scenario as JSON.
    Defaults,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Scenario JSON.
    #[arg(long)]
    scenario: PathBuf,

    /// Log busy retries and other debug events to stderr.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Scenario {
    backend: BackendKind,
    /// Share a context mutex with the array-slice backend.
    context_mutex: bool,
    opts: TransactionOpts,
    sim: SimConfig,
    frames: Vec<FrameDesc>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            backend: BackendKind::PoolIndexed,
            context_mutex: true,
            opts: TransactionOpts::default(),
            sim: SimConfig::default(),
            frames: vec![FrameDesc::default()],
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct FrameDesc {
    surface: u32,
    picture_parameters: usize,
    quant_matrix: usize,
    bitstream: usize,
    slice_control: usize,
    mb_count: u32,
}

impl Default for FrameDesc {
    fn default() -> Self {
        Self {
            surface: 0,
            picture_parameters: 64,
            quant_matrix: 0,
            bitstream: 4096,
            slice_control: 16,
            mb_count: 0,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct FrameReport {
    frame: usize,
    surface_index: u32,
    ok: bool,
    error: Option<String>,
    phase: Option<&'static str>,
    begin_attempts: u32,
    submitted: Vec<Option<BufferType>>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Simulate(args) => cmd_simulate(args),
        Command::Defaults => {
            println!("{}", serde_json::to_string_pretty(&Scenario::default())?);
            Ok(())
        }
    }
}

fn read_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let f = File::open(path).with_context(|| format!("open scenario '{}'", path.display()))?;
    let scenario: Scenario =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse scenario JSON")?;
    Ok(scenario)
}

fn build_session(scenario: &Scenario) -> (DecodeSession, SimHandle) {
    let (session, log) = match scenario.backend {
        BackendKind::PoolIndexed => {
            let (device, log) = SimPoolDecoder::new(scenario.sim.clone());
            let surfaces = device.surfaces();
            (DecodeSession::pool_indexed(device, surfaces), log)
        }
        BackendKind::ArraySlice => {
            let mutex = scenario.context_mutex.then(ContextMutex::new);
            let (mut context, log) = SimVideoContext::new(scenario.sim.clone());
            if let Some(m) = &mutex {
                context = context.with_lock_probe(m.clone());
            }
            (
                DecodeSession::array_slice(context, DecoderHandle(1), mutex),
                log,
            )
        }
    };
    (session.with_opts(scenario.opts), log)
}

/// Deterministic payload bytes so slot contents are recognizable in logs.
fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let scenario = read_scenario(&args.scenario)?;
    for (i, desc) in scenario.frames.iter().enumerate() {
        anyhow::ensure!(
            desc.surface < scenario.sim.surface_count,
            "frame {i}: surface {} out of range (surface_count = {})",
            desc.surface,
            scenario.sim.surface_count
        );
    }

    let (mut session, log) = build_session(&scenario);
    for (i, desc) in scenario.frames.iter().enumerate() {
        let frame = DecodedFrame::new(SimConfig::surface(desc.surface));
        let pp = payload(desc.picture_parameters, 0x10);
        let qm = payload(desc.quant_matrix, 0x40);
        let bs = payload(desc.bitstream, 0x80);
        let sc = payload(desc.slice_control, 0xC0);

        log.clear();
        let result = session.decode_frame(&frame, &pp, &qm, |backend, bitstream, slice| {
            commit_buffer(backend, bitstream, BufferType::Bitstream, &bs, desc.mb_count)?;
            commit_buffer(backend, slice, BufferType::SliceControl, &sc, desc.mb_count)
        });

        let observed = log.snapshot();
        let report = FrameReport {
            frame: i,
            surface_index: session.surface_index(&frame),
            ok: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            phase: result.as_ref().err().map(|e| e.phase()),
            begin_attempts: observed.begin_attempts,
            submitted: observed
                .batches
                .last()
                .map(|b| b.iter().map(|d| BufferType::from_raw(d.buffer_type)).collect())
                .unwrap_or_default(),
        };
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
