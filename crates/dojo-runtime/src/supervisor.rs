//! Run lifecycle: work, signal escalation, cleanup, exit code.
//!
//! The driver call that does the work blocks, so it runs on tokio's
//! blocking pool while [`supervise`] listens for signals. The first signal
//! asks the driver to stop the containers, the second to kill them. Each of
//! those runs as its own tracked task and cleanup waits for all of them.

use std::fmt;
use std::sync::Arc;

use dojo_common::config::Action;
use dojo_common::constants::{
    EXIT_DOUBLE_SIGNAL, EXIT_FATAL, EXIT_OTHER_SIGNAL, EXIT_SIGINT, EXIT_SIGTERM,
};
use dojo_common::error::Result;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::context::RunContext;
use crate::driver::Driver;

/// An OS signal forwarded to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaughtSignal {
    /// SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Any other signal, by number.
    Other(i32),
}

impl CaughtSignal {
    /// Exit code reported when this signal interrupted the run.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => EXIT_SIGINT,
            Self::Terminate => EXIT_SIGTERM,
            Self::Other(_) => EXIT_OTHER_SIGNAL,
        }
    }
}

impl fmt::Display for CaughtSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Other(n) => write!(f, "signal {n}"),
        }
    }
}

/// Picks the process exit code: a failed cleanup wins, then a caught
/// signal, then the work's own code.
#[must_use]
pub const fn final_exit_code(work: i32, signal: Option<i32>, cleanup: i32) -> i32 {
    if cleanup != 0 {
        cleanup
    } else if let Some(code) = signal {
        code
    } else {
        work
    }
}

enum Step {
    Stop,
    Kill,
}

#[derive(Debug, Default)]
struct Escalation {
    caught: u32,
    exit_code: Option<i32>,
}

impl Escalation {
    fn on_signal(&mut self, signal: CaughtSignal) -> Option<Step> {
        self.caught += 1;
        match self.caught {
            1 => {
                self.exit_code = Some(signal.exit_code());
                tracing::info!(%signal, "caught signal, stopping containers");
                Some(Step::Stop)
            }
            2 => {
                self.exit_code = Some(EXIT_DOUBLE_SIGNAL);
                tracing::warn!(%signal, "caught second signal, killing containers");
                Some(Step::Kill)
            }
            n => {
                tracing::info!(%signal, count = n, "containers are being killed already, ignoring signal");
                None
            }
        }
    }
}

struct Supervisor {
    driver: Arc<dyn Driver>,
    ctx: Arc<RunContext>,
    handlers: JoinSet<Result<i32>>,
    escalation: Escalation,
}

impl Supervisor {
    fn on_signal(&mut self, signal: CaughtSignal) {
        let Some(step) = self.escalation.on_signal(signal) else {
            return;
        };
        if self.ctx.config.action != Action::Run {
            // A pull gets the signal directly and dies on its own.
            return;
        }
        let driver = Arc::clone(&self.driver);
        let ctx = Arc::clone(&self.ctx);
        let _ = match step {
            Step::Stop => self
                .handlers
                .spawn_blocking(move || driver.handle_signal(&ctx)),
            Step::Kill => self
                .handlers
                .spawn_blocking(move || driver.handle_multiple_signal(&ctx)),
        };
    }
}

/// Returns the code of a finished blocking task, or `None` after logging
/// a fatal failure.
fn settle(joined: std::result::Result<Result<i32>, JoinError>, task: &str) -> Option<i32> {
    match joined {
        Ok(Ok(code)) => {
            tracing::debug!(task, exit_code = code, "task finished");
            Some(code)
        }
        Ok(Err(e)) => {
            tracing::error!(task, "{e}");
            None
        }
        Err(e) => {
            tracing::error!(task, "task did not complete: {e}");
            None
        }
    }
}

/// Runs the configured action to completion and returns the process exit
/// code.
///
/// Signals arrive through `signals`. Unexpected driver failures end the
/// run immediately with [`EXIT_FATAL`] and skip cleanup.
pub async fn supervise(
    driver: Arc<dyn Driver>,
    ctx: Arc<RunContext>,
    mut signals: mpsc::Receiver<CaughtSignal>,
) -> i32 {
    let action = ctx.config.action;
    let mut work = {
        let driver = Arc::clone(&driver);
        let ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || match action {
            Action::Run => driver.handle_run(&ctx),
            Action::Pull => driver.handle_pull(&ctx),
        })
    };
    let mut supervisor = Supervisor {
        driver: Arc::clone(&driver),
        ctx: Arc::clone(&ctx),
        handlers: JoinSet::new(),
        escalation: Escalation::default(),
    };

    let work_code = loop {
        tokio::select! {
            joined = &mut work => match settle(joined, "work") {
                Some(code) => break code,
                None => return EXIT_FATAL,
            },
            Some(signal) = signals.recv() => supervisor.on_signal(signal),
            Some(joined) = supervisor.handlers.join_next() => {
                if settle(joined, "signal handler").is_none() {
                    return EXIT_FATAL;
                }
            }
        }
    };

    // Cleanup must not race a stop or kill still in flight.
    while !supervisor.handlers.is_empty() {
        tokio::select! {
            Some(signal) = signals.recv() => supervisor.on_signal(signal),
            Some(joined) = supervisor.handlers.join_next() => {
                if settle(joined, "signal handler").is_none() {
                    return EXIT_FATAL;
                }
            }
        }
    }

    let signal_code = supervisor.escalation.exit_code;
    if action != Action::Run {
        return final_exit_code(work_code, signal_code, 0);
    }
    let cleanup = tokio::task::spawn_blocking(move || driver.clean_after_run(&ctx)).await;
    let cleanup_code = settle(cleanup, "cleanup").unwrap_or(EXIT_FATAL);
    let code = final_exit_code(work_code, signal_code, cleanup_code);
    tracing::debug!(work = work_code, signal = ?signal_code, cleanup = cleanup_code, exit_code = code, "exiting");
    code
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use dojo_common::config::Config;
    use dojo_common::error::DojoError;

    use super::*;
    use crate::env::EnvSnapshot;

    struct FakeDriver {
        release: Mutex<std_mpsc::Receiver<i32>>,
        calls: Mutex<Vec<&'static str>>,
        cleanup_code: i32,
        fail_run: bool,
    }

    impl FakeDriver {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn wait_for_release(&self) -> i32 {
            self.release.lock().unwrap().recv().unwrap_or(0)
        }
    }

    impl Driver for FakeDriver {
        fn handle_run(&self, _ctx: &RunContext) -> Result<i32> {
            self.record("run");
            if self.fail_run {
                return Err(DojoError::Parse {
                    message: "broken inspect output".into(),
                });
            }
            Ok(self.wait_for_release())
        }

        fn handle_pull(&self, _ctx: &RunContext) -> Result<i32> {
            self.record("pull");
            Ok(self.wait_for_release())
        }

        fn handle_signal(&self, _ctx: &RunContext) -> Result<i32> {
            self.record("stop");
            Ok(0)
        }

        fn handle_multiple_signal(&self, _ctx: &RunContext) -> Result<i32> {
            self.record("kill");
            Ok(0)
        }

        fn clean_after_run(&self, _ctx: &RunContext) -> Result<i32> {
            self.record("clean");
            Ok(self.cleanup_code)
        }
    }

    struct Harness {
        driver: Arc<FakeDriver>,
        release: std_mpsc::Sender<i32>,
        signals: mpsc::Sender<CaughtSignal>,
        supervised: tokio::task::JoinHandle<i32>,
    }

    impl Harness {
        fn start(action: Action, cleanup_code: i32, fail_run: bool) -> Self {
            let (release, release_rx) = std_mpsc::channel();
            let (signals, signals_rx) = mpsc::channel(8);
            let driver = Arc::new(FakeDriver {
                release: Mutex::new(release_rx),
                calls: Mutex::new(Vec::new()),
                cleanup_code,
                fail_run,
            });
            let ctx = Arc::new(RunContext::new(
                "testdojorunid".into(),
                Config {
                    action,
                    ..Config::default()
                },
                EnvSnapshot::default(),
            ));
            let supervised = tokio::spawn(supervise(driver.clone(), ctx, signals_rx));
            Self {
                driver,
                release,
                signals,
                supervised,
            }
        }

        async fn wait_for_call(&self, call: &str) {
            for _ in 0..500 {
                if self.driver.calls().contains(&call) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("{call} never happened: {:?}", self.driver.calls());
        }

        async fn finish(self, work_code: i32) -> (i32, Vec<&'static str>) {
            self.release.send(work_code).unwrap();
            let code = self.supervised.await.unwrap();
            (code, self.driver.calls())
        }
    }

    #[test]
    fn exit_code_precedence() {
        for work in [0, 5] {
            for signal in [None, Some(130), Some(3)] {
                for cleanup in [0, 4] {
                    let expected = match (cleanup, signal) {
                        (4, _) => 4,
                        (_, Some(code)) => code,
                        (_, None) => work,
                    };
                    assert_eq!(
                        final_exit_code(work, signal, cleanup),
                        expected,
                        "work={work} signal={signal:?} cleanup={cleanup}"
                    );
                }
            }
        }
    }

    #[test]
    fn signal_exit_codes() {
        assert_eq!(CaughtSignal::Interrupt.exit_code(), 130);
        assert_eq!(CaughtSignal::Terminate.exit_code(), 2);
        assert_eq!(CaughtSignal::Other(1).exit_code(), 99);
    }

    #[tokio::test]
    async fn work_code_is_returned_after_cleanup() {
        let harness = Harness::start(Action::Run, 0, false);
        harness.wait_for_call("run").await;
        let (code, calls) = harness.finish(5).await;
        assert_eq!(code, 5);
        assert_eq!(calls, vec!["run", "clean"]);
    }

    #[tokio::test]
    async fn first_signal_stops_and_sets_code() {
        let harness = Harness::start(Action::Run, 0, false);
        harness.wait_for_call("run").await;
        harness.signals.send(CaughtSignal::Interrupt).await.unwrap();
        harness.wait_for_call("stop").await;
        let (code, calls) = harness.finish(0).await;
        assert_eq!(code, 130);
        assert_eq!(calls, vec!["run", "stop", "clean"]);
    }

    #[tokio::test]
    async fn second_signal_kills_and_later_ones_are_ignored() {
        let harness = Harness::start(Action::Run, 0, false);
        harness.wait_for_call("run").await;
        harness.signals.send(CaughtSignal::Terminate).await.unwrap();
        harness.wait_for_call("stop").await;
        harness.signals.send(CaughtSignal::Interrupt).await.unwrap();
        harness.wait_for_call("kill").await;
        harness.signals.send(CaughtSignal::Interrupt).await.unwrap();
        harness.signals.send(CaughtSignal::Other(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (code, calls) = harness.finish(137).await;
        assert_eq!(code, 3);
        assert_eq!(calls, vec!["run", "stop", "kill", "clean"]);
    }

    #[tokio::test]
    async fn failed_cleanup_wins_over_signal() {
        let harness = Harness::start(Action::Run, 4, false);
        harness.wait_for_call("run").await;
        harness.signals.send(CaughtSignal::Interrupt).await.unwrap();
        harness.wait_for_call("stop").await;
        let (code, _) = harness.finish(0).await;
        assert_eq!(code, 4);
    }

    #[tokio::test]
    async fn fatal_work_error_skips_cleanup() {
        let harness = Harness::start(Action::Run, 0, true);
        let code = harness.supervised.await.unwrap();
        assert_eq!(code, 1);
        assert_eq!(harness.driver.calls(), vec!["run"]);
    }

    #[tokio::test]
    async fn pull_only_records_signal_code() {
        let harness = Harness::start(Action::Pull, 0, false);
        harness.wait_for_call("pull").await;
        harness.signals.send(CaughtSignal::Interrupt).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (code, calls) = harness.finish(0).await;
        assert_eq!(code, 130);
        assert_eq!(calls, vec!["pull"]);
    }
}
