//! Periodic control loop driving a [`DispatchEngine`] on its own thread.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::dispatch::engine::DispatchEngine;
use crate::meter::MeasurementSource;

/// Running control loop. Stops on [`ControlLoop::stop`] or when dropped.
#[derive(Debug)]
pub struct ControlLoop {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<usize>>,
}

impl ControlLoop {
    /// Starts ticking `engine` every `interval`, polling `source` each tick.
    ///
    /// The first tick runs immediately.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(
        engine: Arc<DispatchEngine>,
        mut source: Box<dyn MeasurementSource>,
        interval: Duration,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("dispatch-control-loop".into())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "control loop started");
                let mut ticks = 0_usize;
                loop {
                    let report = engine.tick(source.as_mut());
                    ticks += 1;
                    debug!(
                        tick = ticks,
                        fresh = report.measurement_fresh,
                        planned = report.plan.is_some(),
                        dispatched = report.dispatch.is_some(),
                        "control tick"
                    );
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(ticks, "control loop stopped");
                ticks
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the loop, waits for the current tick, and returns the tick count.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited; nothing to signal then.
            let _ = tx.send(());
        }
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(ticks)) => ticks,
            Some(Err(_)) => {
                error!("control loop thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FacilityConfig;
    use crate::dispatch::clock::SystemClock;
    use crate::dispatch::executor::RecordingActuators;
    use crate::meter::SimulatedMeter;

    #[test]
    fn start_then_stop_joins() {
        let cfg = FacilityConfig::baseline();
        let meter = SimulatedMeter::new(&cfg);
        let engine = Arc::new(
            DispatchEngine::with_forecast_generator(
                cfg,
                Arc::new(RecordingActuators::new()),
                Arc::new(SystemClock),
            )
            .unwrap(),
        );

        let control = ControlLoop::start(
            Arc::clone(&engine),
            Box::new(meter),
            Duration::from_millis(5),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        let ticks = control.stop();

        assert!(ticks >= 1);
        assert_eq!(engine.recent_measurements(usize::MAX).len(), ticks);
        assert!(engine.latest_plan().is_some());
    }
}
