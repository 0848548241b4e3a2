//! The run loop: fixed-step RK4 over a [`PendulumModel`], driven on its own
//! thread and steered through an [`IntegratorControl`] handle.
//!
//! Per step the loop waits out a pause, reconciles external edits, takes one
//! RK4 step, sleeps the configured delay, projects the new state onto the
//! geometry, and then checks the step limit and the finish request.
//! Cancellation is cooperative and observed once per iteration.

use crate::config::{IntegratorSettings, StepLimit};
use crate::error::GeometryFault;
use crate::solvers::RK4;
use crate::traits::{PendulumModel, Steppable};
use anyhow::{bail, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Granularity of the pause poll. Resume and finish requests also wake the
/// loop directly, so this only bounds the latency of a missed notification.
pub const PAUSE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The finite step limit was reached.
    Completed,
    /// `request_to_finish` was observed.
    Cancelled,
    /// The geometry rejected a projected state.
    Faulted(GeometryFault),
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub steps: u64,
    pub time: f64,
    pub state: Vec<f64>,
}

/// A state handed to the step observer after a successful projection.
#[derive(Debug, Clone, Copy)]
pub struct StepSample<'a> {
    pub step: u64,
    pub time: f64,
    pub state: &'a [f64],
}

#[derive(Debug)]
struct Flags {
    phase: RunPhase,
    paused: bool,
    finish_requested: bool,
    delay: Duration,
}

#[derive(Debug)]
struct ControlInner {
    flags: Mutex<Flags>,
    wake: Condvar,
}

/// Thread-safe handle for steering a run. None of its methods wait on the
/// integrator thread.
#[derive(Debug, Clone)]
pub struct IntegratorControl {
    inner: Arc<ControlInner>,
}

impl IntegratorControl {
    fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                flags: Mutex::new(Flags {
                    phase: RunPhase::Created,
                    paused: false,
                    finish_requested: false,
                    delay,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.inner.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pause(&self) {
        let mut flags = self.flags();
        flags.paused = true;
        if flags.phase == RunPhase::Running {
            flags.phase = RunPhase::Paused;
        }
    }

    pub fn resume(&self) {
        let mut flags = self.flags();
        flags.paused = false;
        if flags.phase == RunPhase::Paused {
            flags.phase = RunPhase::Running;
        }
        self.inner.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.flags().paused
    }

    /// Asks the run to stop at the end of its current iteration.
    pub fn request_to_finish(&self) {
        self.flags().finish_requested = true;
        self.inner.wake.notify_all();
    }

    pub fn has_request_to_finish(&self) -> bool {
        self.flags().finish_requested
    }

    /// Takes effect from the next inter-step sleep.
    pub fn set_delay(&self, delay: Duration) {
        self.flags().delay = delay;
    }

    pub fn delay(&self) -> Duration {
        self.flags().delay
    }

    pub fn phase(&self) -> RunPhase {
        self.flags().phase
    }

    fn set_phase(&self, phase: RunPhase) {
        let mut flags = self.flags();
        if flags.phase != RunPhase::Finished {
            flags.phase = phase;
        }
    }

    /// Blocks while paused. Returns `false` if a finish request arrived.
    fn wait_while_paused(&self) -> bool {
        let mut flags = self.flags();
        while flags.paused && !flags.finish_requested {
            flags.phase = RunPhase::Paused;
            flags = self
                .inner
                .wake
                .wait_timeout(flags, PAUSE_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if !flags.finish_requested {
            flags.phase = RunPhase::Running;
        }
        !flags.finish_requested
    }

    /// Sleeps the configured delay, cut short by a finish request. A delay
    /// too long to express as a deadline waits for the finish request alone.
    fn sleep_delay(&self) {
        let mut flags = self.flags();
        let deadline = Instant::now().checked_add(flags.delay);
        while !flags.finish_requested {
            let Some(deadline) = deadline else {
                flags = self
                    .inner
                    .wake
                    .wait(flags)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            flags = self
                .inner
                .wake
                .wait_timeout(flags, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

type StepObserver = Box<dyn FnMut(StepSample<'_>) + Send>;
type FaultNotice = Box<dyn FnMut(&GeometryFault) + Send>;

/// Owns one run of one model. Consumed by [`run`](Integrator::run), so a
/// finished integrator can never be restarted.
pub struct Integrator<M: PendulumModel> {
    model: M,
    time: f64,
    dt: f64,
    step_limit: StepLimit,
    control: IntegratorControl,
    observer: Option<StepObserver>,
    notice: Option<FaultNotice>,
}

impl<M: PendulumModel> Integrator<M> {
    pub fn new(
        model: M,
        initial_time: f64,
        dt: f64,
        step_limit: StepLimit,
        delay: Duration,
    ) -> Result<Self> {
        if !initial_time.is_finite() {
            bail!("Initial time must be finite.");
        }
        if !dt.is_finite() || dt == 0.0 {
            bail!("Step size dt must be finite and non-zero.");
        }
        Ok(Self {
            model,
            time: initial_time,
            dt,
            step_limit,
            control: IntegratorControl::new(delay),
            observer: None,
            notice: None,
        })
    }

    pub fn from_settings(model: M, settings: &IntegratorSettings) -> Result<Self> {
        settings.validate()?;
        Self::new(
            model,
            settings.initial_time,
            settings.dt,
            settings.step_limit,
            settings.delay(),
        )
    }

    /// Called on the integrator thread after every projected step.
    #[must_use]
    pub fn on_step(mut self, observer: impl FnMut(StepSample<'_>) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Called once with the fault that ends a run, to tell the user.
    #[must_use]
    pub fn with_fault_notice(mut self, notice: impl FnMut(&GeometryFault) + Send + 'static) -> Self {
        self.notice = Some(Box::new(notice));
        self
    }

    pub fn control(&self) -> IntegratorControl {
        self.control.clone()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs to completion on the calling thread.
    pub fn run(mut self) -> RunReport {
        let control = self.control.clone();
        control.set_phase(RunPhase::Running);

        let mut state = self.model.initial_state();
        if let Some(clock) = state.first_mut() {
            *clock = self.time;
        }
        let mut stepper = RK4::new(state.len());
        let mut time = self.time;
        let mut steps = 0u64;
        tracing::info!(
            dim = state.len(),
            dt = self.dt,
            limit = ?self.step_limit,
            "integration started"
        );

        let outcome = loop {
            if !control.wait_while_paused() {
                break RunOutcome::Cancelled;
            }

            self.model.synchronize(&mut state);
            stepper.step(&self.model, &mut time, &mut state, self.dt);
            steps += 1;

            control.sleep_delay();

            if let Err(fault) = self.model.project_geometry(&state) {
                tracing::error!(%fault, step = steps, "error in calculations, stopping run");
                if let Some(notice) = self.notice.as_mut() {
                    notice(&fault);
                }
                control.request_to_finish();
                break RunOutcome::Faulted(fault);
            }

            if let Some(observer) = self.observer.as_mut() {
                observer(StepSample {
                    step: steps,
                    time,
                    state: &state,
                });
            }

            if self.step_limit.is_exhausted(steps) {
                control.request_to_finish();
                break RunOutcome::Completed;
            }

            if control.has_request_to_finish() {
                break RunOutcome::Cancelled;
            }
        };

        control.set_phase(RunPhase::Finished);
        tracing::info!(?outcome, steps, time, "integration finished");
        RunReport {
            outcome,
            steps,
            time,
            state,
        }
    }
}

impl<M: PendulumModel + 'static> Integrator<M> {
    /// Starts the run on a dedicated integrator thread.
    pub fn spawn(self) -> std::io::Result<RunHandle> {
        let control = self.control.clone();
        let thread = thread::Builder::new()
            .name("integrator".into())
            .spawn(move || self.run())?;
        Ok(RunHandle { control, thread })
    }
}

/// A run executing on its own thread.
pub struct RunHandle {
    control: IntegratorControl,
    thread: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn control(&self) -> &IntegratorControl {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the run to end. Propagates a panic from the run loop.
    pub fn join(self) -> RunReport {
        match self.thread.join() {
            Ok(report) => report,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Requests a finish and waits for it.
    pub fn finish(self) -> RunReport {
        self.control.request_to_finish();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Quantity;
    use crate::geometry::{Rod, RodChain};
    use crate::models::{DoublePendulum, ModelKind, Pendulum};
    use crate::params::ParameterControl;
    use crate::traits::DynamicalSystem;
    use approx::assert_relative_eq;
    use std::sync::mpsc;

    /// `x' = c` with no geometry attached.
    struct Constant {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Constant {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = 1.0;
            out[1] = self.rate;
        }
    }

    impl PendulumModel for Constant {
        fn initial_state(&mut self) -> Vec<f64> {
            vec![0.0, 0.0]
        }

        fn synchronize(&mut self, _state: &mut [f64]) {}

        fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault> {
            if state[1] > 1.0 {
                return Err(GeometryFault::NonFinite {
                    rod: 0,
                    quantity: Quantity::Length,
                    value: state[1],
                });
            }
            Ok(())
        }
    }

    fn double_pendulum() -> DoublePendulum {
        DoublePendulum::new(RodChain::from_rods(vec![
            Rod {
                angle: 1.0,
                length: 5.0,
            },
            Rod {
                angle: -0.5,
                length: 5.0,
            },
        ]))
        .unwrap()
    }

    fn finite(model: impl PendulumModel, steps: u64) -> Integrator<impl PendulumModel> {
        Integrator::new(model, 0.0, 0.01, StepLimit::Finite(steps), Duration::ZERO).unwrap()
    }

    fn assert_err_contains<T>(result: anyhow::Result<T>, needle: &str) {
        let message = match result {
            Ok(_) => panic!("expected error"),
            Err(err) => format!("{err}"),
        };
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn rejects_invalid_settings() {
        let build = |t0: f64, dt: f64| {
            Integrator::new(Constant { rate: 1.0 }, t0, dt, StepLimit::Indefinite, Duration::ZERO)
        };
        assert_err_contains(build(0.0, 0.0), "Step size dt");
        assert_err_contains(build(0.0, f64::INFINITY), "Step size dt");
        assert_err_contains(build(f64::NAN, 0.1), "Initial time");
        assert!(build(0.0, -0.1).is_ok());

        let settings = IntegratorSettings::default().with_dt(f64::NAN);
        assert_err_contains(
            Integrator::from_settings(Constant { rate: 1.0 }, &settings),
            "dt",
        );
    }

    #[test]
    fn finite_limit_runs_exactly_that_many_steps() {
        let report = finite(Constant { rate: 0.5 }, 40).run();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.steps, 40);
        assert_relative_eq!(report.time, 0.4, epsilon = 1e-12);
        assert_relative_eq!(report.state[0], 0.4, epsilon = 1e-12);
        assert_relative_eq!(report.state[1], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn time_starts_from_initial_time() {
        let settings = IntegratorSettings::default()
            .with_dt(0.5)
            .with_step_limit(StepLimit::Finite(4))
            .with_delay_ms(0);
        let mut integrator = Integrator::from_settings(Constant { rate: 0.0 }, &settings).unwrap();
        integrator.time = 10.0;
        let report = integrator.run();
        assert_eq!(report.time, 12.0);
        assert_eq!(report.state[0], 12.0);
    }

    #[test]
    fn degenerate_geometry_stops_run_and_notifies_once() {
        let (tx, rx) = mpsc::channel();
        let integrator = finite(Constant { rate: 40.0 }, 1000).with_fault_notice(move |fault| {
            tx.send(fault.clone()).unwrap();
        });
        let control = integrator.control();
        let report = integrator.run();

        // 0.4 per step crosses 1.0 on the third step.
        assert_eq!(report.steps, 3);
        assert!(matches!(report.outcome, RunOutcome::Faulted(_)));
        assert_eq!(rx.try_iter().count(), 1);
        assert!(control.has_request_to_finish());
        assert_eq!(control.phase(), RunPhase::Finished);
    }

    #[test]
    fn observer_sees_every_step_in_order() {
        let (tx, rx) = mpsc::channel();
        let report = finite(Constant { rate: 0.0 }, 25)
            .on_step(move |sample| tx.send((sample.step, sample.time)).unwrap())
            .run();
        let samples: Vec<_> = rx.try_iter().collect();
        assert_eq!(samples.len(), 25);
        assert!(samples.windows(2).all(|w| w[1].0 == w[0].0 + 1 && w[1].1 > w[0].1));
        assert_eq!(samples.last().map(|s| s.0), Some(report.steps));
    }

    #[test]
    fn pause_then_resume_leaves_trajectory_unchanged() {
        let baseline = finite(double_pendulum(), 300).run();

        let integrator = finite(double_pendulum(), 300);
        let control = integrator.control();
        control.pause();
        control.resume();
        let handle = integrator.spawn().unwrap();
        handle.control().pause();
        handle.control().resume();
        let report = handle.join();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.steps, baseline.steps);
        for (a, b) in report.state.iter().zip(&baseline.state) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn finish_while_paused_ends_run_without_stepping() {
        let integrator = Integrator::new(
            ModelKind::Double.build_default().unwrap(),
            0.0,
            0.01,
            StepLimit::Indefinite,
            Duration::ZERO,
        )
        .unwrap();
        let control = integrator.control();
        control.pause();
        assert_eq!(control.phase(), RunPhase::Created);

        let handle = integrator.spawn().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.control().phase() != RunPhase::Paused && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.control().phase(), RunPhase::Paused);

        let asked = Instant::now();
        let report = handle.finish();
        assert!(asked.elapsed() < PAUSE_POLL * 2);
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.steps, 0);
        assert_eq!(control.phase(), RunPhase::Finished);
    }

    #[test]
    fn finish_request_interrupts_long_delay() {
        let integrator = Integrator::new(
            Constant { rate: 0.0 },
            0.0,
            0.01,
            StepLimit::Indefinite,
            Duration::from_secs(60),
        )
        .unwrap();
        let handle = integrator.spawn().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.control().phase() != RunPhase::Running && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let asked = Instant::now();
        let report = handle.finish();
        assert!(asked.elapsed() < Duration::from_secs(5));
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(report.steps <= 1);
    }

    #[test]
    fn unbounded_delay_set_mid_run_still_finishes() {
        let integrator = Integrator::new(
            Constant { rate: 0.0 },
            0.0,
            0.01,
            StepLimit::Indefinite,
            Duration::ZERO,
        )
        .unwrap();
        let control = integrator.control();
        let (tx, rx) = mpsc::channel();
        let handle = integrator
            .on_step(move |sample| {
                if sample.step == 1 {
                    control.set_delay(Duration::MAX);
                    let _ = tx.send(());
                }
            })
            .spawn()
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        thread::sleep(Duration::from_millis(50));
        let report = handle.finish();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.steps, 2);
    }

    #[test]
    fn delay_is_adjustable_from_outside() {
        let integrator = finite(Constant { rate: 0.0 }, 1);
        let control = integrator.control();
        assert_eq!(control.delay(), Duration::ZERO);
        control.set_delay(Duration::from_millis(3));
        assert_eq!(control.delay(), Duration::from_millis(3));
        assert!(!control.is_paused());
        control.pause();
        assert!(control.is_paused());
        control.resume();
        let report = integrator.run();
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    #[test]
    fn mass_edit_mid_run_only_affects_later_steps() {
        let record = |edit_at: Option<u64>| {
            let model = double_pendulum();
            let controls = model.controls();
            let (tx, rx) = mpsc::channel();
            finite(model, 120)
                .on_step(move |sample| {
                    tx.send(sample.state.to_vec()).unwrap();
                    if Some(sample.step) == edit_at {
                        controls.set_mass(1, 4.0).unwrap();
                    }
                })
                .run();
            rx.try_iter().collect::<Vec<_>>()
        };

        let baseline = record(None);
        let edited = record(Some(60));

        assert_eq!(&edited[..60], &baseline[..60]);
        assert_ne!(edited[60], baseline[60]);
    }

    #[test]
    fn angle_edit_from_another_thread_lands_on_state() {
        let model = ModelKind::Simple.build_default().unwrap();
        let controls = model.controls();
        let (tx, rx) = mpsc::channel();
        let integrator = Integrator::new(
            model,
            0.0,
            0.001,
            StepLimit::Indefinite,
            Duration::from_millis(1),
        )
        .unwrap()
        .on_step(move |sample| {
            let _ = tx.send(sample.state[5]);
        });
        let handle = integrator.spawn().unwrap();

        thread::spawn(move || controls.set_rod_angle(0, 1.0).unwrap())
            .join()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while !seen && Instant::now() < deadline {
            if let Ok(angle) = rx.recv_timeout(Duration::from_millis(100)) {
                seen = (angle - 1.0).abs() < 0.01;
            }
        }
        let report = handle.finish();
        assert!(seen, "edited angle never reached the trajectory");
        assert_eq!(report.outcome, RunOutcome::Cancelled);
    }

    #[test]
    fn wrapped_model_runs_like_a_concrete_one() {
        let model: Pendulum = ModelKind::SpringDouble.build_default().unwrap();
        let report = finite(model, 10).run();
        assert_eq!(report.state.len(), 9);
        assert_eq!(report.outcome, RunOutcome::Completed);
    }
}
