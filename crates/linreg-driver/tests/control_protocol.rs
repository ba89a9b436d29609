// SPDX-License-Identifier: AGPL-3.0-only

//! Control loop protocol tests
//!
//! Runs the loop against scripted channels and checks the recorded
//! instruction trace.

use linreg_driver::{
    CancelToken, ChannelType, ControlLoop, ConvergenceStatus, LinregConfig, LinregError,
    ManualTicker, Problem, RecordingChannel, Result, TickCounter, TickSource, TimerConfig,
    WordChannel,
};
use linreg_isa::{Instruction, Opcode, Word};
use std::time::Duration;

/// True if no COMPUTE follows a RESET before one of each STORE_* has.
fn stores_precede_compute(trace: &[Instruction]) -> bool {
    let mut seen = [false; 4];
    for insn in trace {
        match insn {
            Instruction::Reset => seen = [false; 4],
            Instruction::StoreX { .. } => seen[0] = true,
            Instruction::StoreY { .. } => seen[1] = true,
            Instruction::StoreT { .. } => seen[2] = true,
            Instruction::StoreAlpha { .. } => seen[3] = true,
            Instruction::Compute { .. } => {
                if !seen.iter().all(|&s| s) {
                    return false;
                }
            }
        }
    }
    true
}

/// Responses that move theta by `step` every iteration, forever.
fn diverging(n: usize, iterations: usize, step: i32) -> Vec<i32> {
    (1..=iterations)
        .flat_map(|k| std::iter::repeat(i32::try_from(k).unwrap() * step).take(n))
        .collect()
}

#[test]
fn trace_starts_with_reset_and_upload() {
    let problem = Problem::reference();
    let ch = RecordingChannel::new().with_responses([2068, 4136]);
    let mut ctl = ControlLoop::new(ch, LinregConfig::default());
    let report = ctl.run(&problem).unwrap();
    assert_eq!(report.status, ConvergenceStatus::Converged);

    let trace = ctl.channel().instructions();
    assert_eq!(trace[0], Instruction::Reset);
    assert_eq!(trace[1], Instruction::StoreX { row: 0, col: 0, value: 2048 });
    assert_eq!(trace[12], Instruction::StoreX { row: 5, col: 1, value: 10260 });
    assert_eq!(trace[13].opcode(), Opcode::StoreY);
    assert_eq!(trace[19], Instruction::StoreT { row: 0, value: 2068 });
    assert_eq!(trace[21], Instruction::StoreAlpha { value: 20 });
    assert_eq!(trace[22], Instruction::Compute { iteration: 1 });
    assert_eq!(trace.last(), Some(&Instruction::Reset));
    assert!(stores_precede_compute(&trace));
}

#[test]
fn stores_precede_every_compute_on_long_runs() {
    let responses = diverging(2, 50, 10);
    let ch = RecordingChannel::new().with_responses(responses);
    let mut ctl = ControlLoop::new(ch, LinregConfig::default().with_max_iterations(40));
    ctl.run(&Problem::reference()).unwrap();
    assert!(stores_precede_compute(&ctl.channel().instructions()));
}

#[test]
fn trace_checker_rejects_early_compute() {
    let bad = [
        Instruction::Reset,
        Instruction::StoreX { row: 0, col: 0, value: 1 },
        Instruction::Compute { iteration: 1 },
    ];
    assert!(!stores_precede_compute(&bad));
}

#[test]
fn converges_on_iteration_k() {
    for k in 1..10_u32 {
        // k − 1 moving iterations, then a repeat
        let mut responses = diverging(2, k as usize - 1, 100);
        let repeat = responses.last().map_or(vec![2068, 4136], |&v| vec![v, v]);
        responses.extend(repeat);

        let ch = RecordingChannel::new().with_responses(responses);
        let mut ctl = ControlLoop::new(ch, LinregConfig::default());
        let report = ctl.run(&Problem::reference()).unwrap();

        assert_eq!(report.status, ConvergenceStatus::Converged, "k = {k}");
        assert_eq!(report.iterations, k);
        assert_eq!(ctl.channel().count(Opcode::Compute), k as usize);
        assert_eq!(ctl.channel().remaining_responses(), 0);
    }
}

#[test]
fn never_converging_stops_at_cap() {
    for cap in [2_u32, 3, 17, 1000] {
        let ch = RecordingChannel::new().with_responses(diverging(2, cap as usize, 7));
        let config = LinregConfig::default().with_max_iterations(cap);
        let mut ctl = ControlLoop::new(ch, config);
        let report = ctl.run(&Problem::reference()).unwrap();

        assert_eq!(report.status, ConvergenceStatus::IterationLimitReached);
        assert_eq!(report.iterations, cap);
        assert_eq!(ctl.channel().count(Opcode::Compute), cap as usize - 1);

        let computes: Vec<u32> = ctl
            .channel()
            .instructions()
            .iter()
            .filter_map(|i| match i {
                Instruction::Compute { iteration } => Some(*iteration),
                _ => None,
            })
            .collect();
        assert_eq!(computes, (1..cap).collect::<Vec<_>>());
    }
}

#[test]
fn threshold_is_absolute() {
    // Each iteration moves theta by exactly 3 units
    let responses = diverging(2, 10, 3).into_iter().map(|v| v + 4136);
    let ch = RecordingChannel::new().with_responses(responses);
    let config = LinregConfig::default().with_threshold(3);
    let problem = Problem::new(vec![vec![2048, 2048]], vec![0], vec![4136, 4136], 20).unwrap();
    let report = ControlLoop::new(ch, config).run(&problem).unwrap();
    assert_eq!(report.status, ConvergenceStatus::Converged);
    assert_eq!(report.iterations, 1);
}

#[test]
fn step_above_threshold_keeps_iterating() {
    // Each iteration moves theta by 4 units, one past the threshold
    let responses = diverging(2, 10, 4).into_iter().map(|v| v + 4136);
    let ch = RecordingChannel::new().with_responses(responses);
    let config = LinregConfig::default()
        .with_threshold(3)
        .with_max_iterations(5);
    let problem = Problem::new(vec![vec![2048, 2048]], vec![0], vec![4136, 4136], 20).unwrap();
    let mut ctl = ControlLoop::new(ch, config);
    let report = ctl.run(&problem).unwrap();

    assert_eq!(report.status, ConvergenceStatus::IterationLimitReached);
    assert_eq!(report.iterations, 5);
    assert_eq!(report.theta, vec![4136 + 16, 4136 + 16]);
    assert_eq!(ctl.channel().count(Opcode::Compute), 4);
}

#[test]
fn cancelled_run_resets_and_reports() {
    let token = CancelToken::new();
    let ch = RecordingChannel::new().with_responses(diverging(2, 10, 50));
    let mut ctl = ControlLoop::new(ch, LinregConfig::default()).with_cancel(token.clone());
    token.cancel();

    let err = ctl.run(&Problem::reference()).unwrap_err();
    assert!(matches!(err, LinregError::Cancelled { iteration: 1 }));
    assert_eq!(
        ctl.channel().instructions().last(),
        Some(&Instruction::Reset)
    );
}

/// Recording channel whose accelerator clock fires one tick per word sent.
#[derive(Debug)]
struct TickingChannel {
    inner: RecordingChannel,
    ticker: ManualTicker,
}

impl WordChannel for TickingChannel {
    fn send(&mut self, word: Word, timeout: Duration) -> Result<()> {
        self.ticker.fire(1);
        self.inner.send(word, timeout)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Word> {
        self.inner.receive(timeout)
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Recording
    }
}

#[test]
fn timed_run_counts_ticks_between_tic_and_toc() {
    let timer = TimerConfig::default();
    let counter = TickCounter::new(timer);
    let mut ticker = ManualTicker::new();
    ticker.register(counter.clone());
    ticker.enable().unwrap();

    // Stale ticks from before the run are discarded by tic()
    ticker.fire(1_000);

    let ch = TickingChannel {
        inner: RecordingChannel::new().with_responses([100, 200, 100, 200]),
        ticker,
    };
    let mut ctl = ControlLoop::new(ch, LinregConfig::default()).with_timer(&counter);
    let report = ctl.run(&Problem::reference()).unwrap();

    let sent = ctl.channel().inner.sent().len() as u64;
    let elapsed = report.elapsed.unwrap();
    assert_eq!(elapsed.ticks(), sent);
    assert_eq!(elapsed.nanos(), Some(sent * 100_000 * 50));
    assert_eq!(
        elapsed.as_duration(),
        Some(Duration::from_nanos(sent) * 5_000_000)
    );
}
