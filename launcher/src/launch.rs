use std::time;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{LaunchError, ProbeError};
use crate::handoff::{Handoff, TargetCommand};
use crate::poll::PollPolicy;
use crate::prepare::Preparer;
use crate::probe::ReadinessProbe;

/// Waits for a dependency, optionally prepares it, then hands the process over to the target
/// command.
pub struct Launcher<P, R, H> {
    /// The check repeated until the dependency is ready.
    probe: P,
    /// The setup step run once the dependency is ready, unless skipped.
    preparer: R,
    /// How the process is handed over to the target command.
    handoff: H,
    /// Spacing of probe attempts, and the optional overall deadline.
    poll_policy: PollPolicy,
    /// Maximum duration of a single probe attempt.
    probe_timeout: time::Duration,
    /// Whether the preparation phase is bypassed.
    skip_preparation: bool,
    /// The command we become at the end.
    target: TargetCommand,
}

impl<P, R, H> Launcher<P, R, H>
where
    P: ReadinessProbe,
    R: Preparer,
    H: Handoff,
{
    pub fn new(
        probe: P,
        preparer: R,
        handoff: H,
        poll_policy: PollPolicy,
        probe_timeout: time::Duration,
        skip_preparation: bool,
        target: TargetCommand,
    ) -> Self {
        Self {
            probe,
            preparer,
            handoff,
            poll_policy,
            probe_timeout,
            skip_preparation,
            target,
        }
    }

    /// Run all three phases. With a handoff that replaces the process, this only ever returns
    /// an error.
    pub async fn run(&self) -> Result<(), LaunchError> {
        let attempts = self.wait_for_dependency().await?;
        info!(
            "{} is ready after {} attempt(s)",
            self.probe.describe(),
            attempts
        );

        if self.skip_preparation {
            info!("skipping preparation");
        } else {
            info!("preparing");
            self.preparer.prepare().await?;
            info!("preparation completed");
        }

        info!("starting `{}`", self.target);
        self.handoff.handoff(&self.target)
    }

    /// Poll the readiness probe until it succeeds. Returns how many attempts it took.
    pub async fn wait_for_dependency(&self) -> Result<u32, LaunchError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        info!("waiting for {}", self.probe.describe());

        loop {
            attempt += 1;

            let attempt_timeout = self
                .poll_policy
                .clamp_to_deadline(started.elapsed(), self.probe_timeout);
            let error = match self.probe_once(attempt_timeout).await {
                Ok(()) => return Ok(attempt),
                Err(error) => error,
            };

            if error.is_fatal() {
                return Err(LaunchError::InvalidConfiguration(format!(
                    "{} refused the launcher: {}",
                    self.probe.describe(),
                    error
                )));
            }

            let elapsed = started.elapsed();
            if self.poll_policy.deadline_passed(elapsed) {
                return Err(LaunchError::DependencyTimeout {
                    endpoint: self.probe.describe(),
                    attempts: attempt,
                    elapsed,
                });
            }

            let interval = self
                .poll_policy
                .clamp_to_deadline(elapsed, self.poll_policy.interval_for(attempt));
            warn!(
                "{} is unavailable ({}), retrying in {:?}",
                self.probe.describe(),
                error,
                interval
            );
            tokio::time::sleep(interval).await;
        }
    }

    async fn probe_once(&self, timeout: time::Duration) -> Result<(), ProbeError> {
        debug!("probing {}", self.probe.describe());

        match tokio::time::timeout(timeout, self.probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::TimedOut(timeout)),
        }
    }
}
