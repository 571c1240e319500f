//! Cooperative task lifecycle: `start` once, `tick` once per iteration, `stop` once.
//!
//! Tasks are generic over the context they mutate, so the same combinator and driver
//! run Monte Carlo phases against a [`Simulation`](super::context::Simulation) and
//! plain closures against anything else.

use super::error::EngineError;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskSignal {
    Ok,
    Stop,
    Error,
}

impl TaskSignal {
    /// Aggregates two signals; `Error` wins over `Stop`, which wins over `Ok`.
    #[inline]
    pub fn combine(self, other: TaskSignal) -> TaskSignal {
        self.max(other)
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == TaskSignal::Ok
    }
}

/// A phase of a run. Every method defaults to a no-op.
///
/// `stop` is called exactly once after a successful `start`, whatever `tick` returned.
pub trait Task<C: ?Sized> {
    fn name(&self) -> &'static str {
        "task"
    }

    fn start(&mut self, _ctx: &mut C) -> Result<(), EngineError> {
        Ok(())
    }

    fn tick(&mut self, _ctx: &mut C, _iteration: u64) -> TaskSignal {
        TaskSignal::Ok
    }

    fn stop(&mut self, _ctx: &mut C) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A task that does nothing, standing in for a disabled phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct Idle;

impl<C: ?Sized> Task<C> for Idle {
    fn name(&self) -> &'static str {
        "idle"
    }
}

/// A stateless task built from a tick closure.
pub struct TickFn<F> {
    name: &'static str,
    tick: F,
}

impl<F> TickFn<F> {
    pub fn new(name: &'static str, tick: F) -> Self {
        Self { name, tick }
    }
}

impl<C: ?Sized, F> Task<C> for TickFn<F>
where
    F: FnMut(&mut C, u64) -> TaskSignal,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn tick(&mut self, ctx: &mut C, iteration: u64) -> TaskSignal {
        (self.tick)(ctx, iteration)
    }
}

/// Runs a fixed, ordered list of borrowed tasks as a single task.
///
/// Slots may be empty, in which case they are skipped in every phase.
pub struct Sequence<'t, C: ?Sized> {
    tasks: Vec<Option<&'t mut dyn Task<C>>>,
}

impl<'t, C: ?Sized> Default for Sequence<'t, C> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<'t, C: ?Sized> Sequence<'t, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, task: &'t mut dyn Task<C>) -> Self {
        self.tasks.push(Some(task));
        self
    }

    pub fn then_optional(mut self, task: Option<&'t mut dyn Task<C>>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn stop_first(&mut self, count: usize, ctx: &mut C) -> Result<(), EngineError> {
        let mut first_error = None;
        for task in self.tasks[..count].iter_mut().rev().flatten() {
            if let Err(e) = task.stop(ctx) {
                error!(task = task.name(), error = %e, "Task failed to stop cleanly.");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<C: ?Sized> Task<C> for Sequence<'_, C> {
    fn name(&self) -> &'static str {
        "sequence"
    }

    /// Starts every task in order. If one fails, the tasks already started are stopped
    /// in reverse order before the error is returned.
    fn start(&mut self, ctx: &mut C) -> Result<(), EngineError> {
        for index in 0..self.tasks.len() {
            let Some(task) = self.tasks[index].as_mut() else {
                continue;
            };
            if let Err(e) = task.start(ctx) {
                error!(task = task.name(), error = %e, "Task failed to start.");
                let _ = self.stop_first(index, ctx);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Ticks every task once, in order, and returns the most severe signal.
    fn tick(&mut self, ctx: &mut C, iteration: u64) -> TaskSignal {
        let mut signal = TaskSignal::Ok;
        for task in self.tasks.iter_mut().flatten() {
            let result = task.tick(ctx, iteration);
            if !result.is_ok() {
                debug!(task = task.name(), iteration, signal = ?result, "Task signalled.");
            }
            signal = signal.combine(result);
        }
        signal
    }

    /// Stops every task in reverse order, even if an earlier stop failed.
    fn stop(&mut self, ctx: &mut C) -> Result<(), EngineError> {
        self.stop_first(self.tasks.len(), ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of ticks performed.
    pub iterations: u64,
    /// The signal that ended the loop, or `Ok` when the iteration limit was reached.
    pub signal: TaskSignal,
}

impl RunSummary {
    /// Whether the run should be reported as a success.
    pub fn is_success(&self) -> bool {
        self.signal != TaskSignal::Error
    }
}

/// Drives `task` to completion: `start`, then `tick` with an increasing iteration
/// counter until a non-`Ok` signal or `max_iterations` ticks, then `stop`.
///
/// # Errors
///
/// Returns the error of a failed `start` (in which case `stop` is not called) or of
/// a failed `stop`.
pub fn run<C: ?Sized>(
    task: &mut dyn Task<C>,
    ctx: &mut C,
    max_iterations: Option<u64>,
) -> Result<RunSummary, EngineError> {
    task.start(ctx)?;

    let mut iteration = 0u64;
    let mut signal = TaskSignal::Ok;
    while !max_iterations.is_some_and(|max| iteration >= max) {
        signal = task.tick(ctx, iteration);
        iteration += 1;
        if !signal.is_ok() {
            break;
        }
    }

    task.stop(ctx)?;
    info!(iterations = iteration, signal = ?signal, "Run finished.");
    Ok(RunSummary {
        iterations: iteration,
        signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<String>;

    struct Recorder {
        label: &'static str,
        stop_at: Option<u64>,
        fail_start: bool,
    }

    impl Recorder {
        fn new(label: &'static str) -> Self {
            Self {
                label,
                stop_at: None,
                fail_start: false,
            }
        }
    }

    impl Task<Log> for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        fn start(&mut self, log: &mut Log) -> Result<(), EngineError> {
            log.push(format!("start {}", self.label));
            if self.fail_start {
                return Err(EngineError::GridNotAllocated);
            }
            Ok(())
        }

        fn tick(&mut self, log: &mut Log, iteration: u64) -> TaskSignal {
            log.push(format!("tick {} {}", self.label, iteration));
            if self.stop_at == Some(iteration) {
                TaskSignal::Stop
            } else {
                TaskSignal::Ok
            }
        }

        fn stop(&mut self, log: &mut Log) -> Result<(), EngineError> {
            log.push(format!("stop {}", self.label));
            Ok(())
        }
    }

    fn stops(log: &Log) -> Vec<&str> {
        log.iter()
            .filter(|line| line.starts_with("stop"))
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn signal_aggregation_prefers_error_over_stop() {
        use TaskSignal::*;
        assert_eq!(Ok.combine(Ok), Ok);
        assert_eq!(Ok.combine(Stop), Stop);
        assert_eq!(Stop.combine(Error), Error);
        assert_eq!(Error.combine(Stop), Error);
    }

    #[test]
    fn second_task_stopping_on_iteration_five_stops_all_in_reverse() {
        let mut a = Recorder::new("a");
        let mut b = Recorder::new("b");
        b.stop_at = Some(5);
        let mut c = Recorder::new("c");
        let mut log = Log::new();

        let mut sequence = Sequence::<Log>::new().then(&mut a).then(&mut b).then(&mut c);
        let summary = run(&mut sequence, &mut log, None).unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.signal, TaskSignal::Stop);
        assert_eq!(summary.iterations, 6);
        assert_eq!(stops(&log), vec!["stop c", "stop b", "stop a"]);
        assert_eq!(&log[..3], ["start a", "start b", "start c"]);
        // All three tasks are ticked in the iteration that stops.
        assert!(log.contains(&"tick c 5".to_string()));
        assert!(!log.iter().any(|line| line.ends_with(" 6")));
    }

    #[test]
    fn error_signal_reports_failure_and_still_stops() {
        let mut ok = Recorder::new("ok");
        let mut failing = TickFn::new("failing", |log: &mut Log, iteration: u64| {
            log.push(format!("tick failing {}", iteration));
            if iteration == 2 {
                TaskSignal::Error
            } else {
                TaskSignal::Ok
            }
        });
        let mut log = Log::new();
        let mut sequence = Sequence::<Log>::new().then(&mut ok).then(&mut failing);
        let summary = run(&mut sequence, &mut log, None).unwrap();

        assert!(!summary.is_success());
        assert_eq!(summary.iterations, 3);
        assert_eq!(stops(&log), vec!["stop ok"]);
    }

    #[test]
    fn failed_start_unwinds_only_started_tasks() {
        let mut a = Recorder::new("a");
        let mut b = Recorder::new("b");
        b.fail_start = true;
        let mut c = Recorder::new("c");
        let mut log = Log::new();

        let mut sequence = Sequence::<Log>::new().then(&mut a).then(&mut b).then(&mut c);
        let result = run(&mut sequence, &mut log, None);

        assert!(matches!(result, Err(EngineError::GridNotAllocated)));
        assert_eq!(log, vec!["start a", "start b", "stop a"]);
    }

    #[test]
    fn empty_slots_and_idle_tasks_are_skipped() {
        let mut a = Recorder::new("a");
        let mut idle = Idle;
        let mut log = Log::new();
        let mut sequence = Sequence::<Log>::new()
            .then_optional(None)
            .then(&mut idle)
            .then(&mut a);
        assert_eq!(sequence.len(), 3);

        let summary = run(&mut sequence, &mut log, Some(4)).unwrap();
        assert_eq!(summary.iterations, 4);
        assert_eq!(summary.signal, TaskSignal::Ok);
        assert!(summary.is_success());
        assert_eq!(log.len(), 1 + 4 + 1);
    }

    #[test]
    fn zero_iteration_limit_still_starts_and_stops() {
        let mut a = Recorder::new("a");
        let mut log = Log::new();
        let summary = run(&mut a, &mut log, Some(0)).unwrap();
        assert_eq!(summary.iterations, 0);
        assert_eq!(log, vec!["start a", "stop a"]);
    }
}
