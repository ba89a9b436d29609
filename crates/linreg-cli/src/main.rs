// SPDX-License-Identifier: AGPL-3.0-only

//! `linreg` — command-line interface for the linear regression accelerator.
//!
//! ```text
//! USAGE:
//!   linreg run [--software | --threaded | --device PATH]   Fit the reference problem
//!   linreg encode                                          Print the upload sequence
//!   linreg decode <WORD>                                   Decode one instruction word
//! ```
//!
//! Without `--software`, `--threaded` or `--device`, the device named by
//! `LINREG_DEVICE` is used if set, the software accelerator otherwise.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use linreg_driver::{
    open_channel, upload_sequence, ChannelSelection, ControlLoop, LinregConfig, Problem,
    ThreadTicker, TickCounter, TickSource, WordChannel,
};
use linreg_isa::{FixedScale, Instruction, Word};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linreg", about = "Linear regression accelerator CLI", version)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run gradient descent on the reference problem.
    Run {
        /// Use the in-process software accelerator.
        #[arg(long, conflicts_with_all = ["threaded", "device"])]
        software: bool,
        /// Use the software accelerator on its own thread behind a FIFO.
        #[arg(long, conflicts_with = "device")]
        threaded: bool,
        /// Accelerator device node (e.g. /dev/linreg0).
        #[arg(long)]
        device: Option<PathBuf>,
        /// Exclusive iteration cap.
        #[arg(long, default_value_t = 1000)]
        max_iterations: u32,
        /// Convergence threshold in fixed-point units.
        #[arg(long, default_value_t = 1)]
        threshold: u32,
        /// Per-word send/receive timeout in milliseconds.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
        /// Fractional bits of the fixed-point format.
        #[arg(long, default_value_t = 11)]
        scale_bits: u32,
        /// Estimate elapsed time from the tick source.
        #[arg(long)]
        timed: bool,
    },
    /// Print the reset and parameter upload for the reference problem.
    Encode,
    /// Decode an instruction word (hex with 0x prefix, or decimal).
    Decode {
        /// Word to decode.
        word: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Cmd::Run {
            software,
            threaded,
            device,
            max_iterations,
            threshold,
            timeout_ms,
            scale_bits,
            timed,
        } => {
            let selection = select(software, threaded, device);
            let scale = FixedScale::from_shift(scale_bits)
                .ok_or_else(|| anyhow!("--scale-bits {scale_bits} exceeds 30"))?;
            let config = LinregConfig::default()
                .with_max_iterations(max_iterations)
                .with_threshold(threshold)
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_scale(scale);
            cmd_run(&selection, config, timed)?;
        }
        Cmd::Encode => cmd_encode()?,
        Cmd::Decode { word } => cmd_decode(&word)?,
    }

    Ok(())
}

fn select(software: bool, threaded: bool, device: Option<PathBuf>) -> ChannelSelection {
    if software {
        return ChannelSelection::Software;
    }
    if threaded {
        return ChannelSelection::Threaded { depth: 8 };
    }
    match device.or_else(LinregConfig::device_from_env) {
        Some(path) => ChannelSelection::Device { path },
        None => ChannelSelection::Software,
    }
}

fn cmd_run(selection: &ChannelSelection, config: LinregConfig, timed: bool) -> Result<()> {
    let scale = config.scale;
    let problem = Problem::reference_at(scale);
    let channel = open_channel(selection, problem.m(), problem.n(), scale)
        .context("opening accelerator channel")?;
    println!("Channel: {}", channel.channel_type());

    let mut ticker = None;
    let mut control = ControlLoop::new(channel, config.clone());
    if timed {
        let counter = TickCounter::new(config.timer);
        let mut source = ThreadTicker::new(&config.timer);
        source.register(counter.clone());
        source.enable()?;
        control = control.with_timer(&counter);
        ticker = Some(source);
    }

    let report = control.run(&problem).context("gradient descent run failed")?;
    if let Some(mut source) = ticker {
        source.disable();
    }
    info!("Run report: {report:?}");

    println!("Status:     {}", report.status);
    println!("Iterations: {}", report.iterations);
    println!("Model:      {}", report.model());
    let coefficients: Vec<String> = report
        .model()
        .coefficients(scale)
        .iter()
        .map(|c| format!("{c:.4}"))
        .collect();
    println!("            ({})", coefficients.join(", "));
    println!(
        "MSE:        {:.6} -> {:.6}",
        problem.mse(problem.theta(), scale),
        problem.mse(&report.theta, scale)
    );
    if let Some(elapsed) = report.elapsed {
        println!("Elapsed:    {elapsed}");
    }

    Ok(())
}

fn cmd_encode() -> Result<()> {
    let problem = Problem::reference();
    let mut sequence = vec![Instruction::reset()];
    sequence.extend(upload_sequence(&problem)?);

    for insn in sequence {
        println!("{:#010x}  {insn}", insn.encode()?);
    }
    Ok(())
}

fn cmd_decode(text: &str) -> Result<()> {
    let word = parse_word(text)?;
    let insn = Instruction::decode(word)?;
    println!("{word:#010x}  {insn}");
    println!("{insn:?}");
    Ok(())
}

fn parse_word(text: &str) -> Result<Word> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => Word::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.with_context(|| format!("'{text}' is not a 32-bit word"))
}
