use derive_more::Display;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::sampling::{task_sample_analog_inputs, ChannelTable};
use crate::{
    config::Config,
    externals::device::{DeviceSession, LinkError, SessionMode},
    models::channel::{ConfigurationError, CHANNEL_COUNT},
    ports::{AnalogInputDevice, TelemetryPort},
};

/// Reasons an activation attempt is refused. Sampling never starts when
/// any of these is returned.
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("Invalid configuration. Error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Sampling is already running.")]
    AlreadyActive,

    #[error("Previous sampling task has not finished stopping.")]
    StillStopping,
}

/// How a running sampling task ended, other than by request.
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Sampling task aborted. Error: {0}")]
    Aborted(#[from] JoinError),
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopping,
}

type SamplingHandle = JoinHandle<Result<(), LinkError>>;

enum Phase {
    Idle,
    Running {
        token: CancellationToken,
        handle: SamplingHandle,
    },
    Stopping {
        handle: SamplingHandle,
    },
}

/// Owns at most one background sampling task and the device session it
/// holds. Activation requires `Idle`; deactivation waits for the task to
/// fully unwind before returning to `Idle`, so two tasks can never share a
/// session.
pub struct Sampler<T> {
    phase: Phase,
    token: CancellationToken,
    telemetry: T,
}

impl<T> Sampler<T>
where
    T: TelemetryPort + Clone + Send + Sync + 'static,
{
    /// Sampling tasks are cancelled along with `token`.
    pub fn new(token: CancellationToken, telemetry: T) -> Self {
        Self {
            phase: Phase::Idle,
            token,
            telemetry,
        }
    }

    pub fn state(&self) -> SamplerState {
        match self.phase {
            Phase::Idle => SamplerState::Idle,
            Phase::Running { .. } => SamplerState::Running,
            Phase::Stopping { .. } => SamplerState::Stopping,
        }
    }

    /// Validate `config`, connect to the controller and start sampling.
    /// Configuration is checked before any network traffic.
    #[instrument(skip_all, fields(mode = %mode))]
    pub async fn activate(
        &mut self,
        config: &Config,
        mode: SessionMode,
    ) -> Result<(), ActivationError> {
        self.ensure_idle()?;
        let table = config.channel_table()?;
        let cadence = config.cadence()?;

        let session = DeviceSession::connect(config.endpoint(), mode).await?;
        self.start(session, table, cadence)
    }

    /// Start sampling from an already connected device.
    pub fn start<D>(
        &mut self,
        device: D,
        table: ChannelTable,
        cadence: std::time::Duration,
    ) -> Result<(), ActivationError>
    where
        D: AnalogInputDevice + 'static,
    {
        self.ensure_idle()?;
        for channel in 0..CHANNEL_COUNT {
            debug!(
                "Channel {}: {} {:?}",
                channel,
                table.kind(channel),
                table.polynomial(channel).coefficients()
            );
        }

        let token = self.token.child_token();
        let handle = tokio::spawn(task_sample_analog_inputs(
            token.clone(),
            device,
            table,
            cadence,
            self.telemetry.clone(),
        ));
        self.phase = Phase::Running { token, handle };
        info!("Sampling every {:?}.", cadence);
        Ok(())
    }

    /// Stop sampling and wait until the task has released its session.
    /// Safe to call in any state, including when activation never completed.
    #[instrument(skip_all)]
    pub async fn deactivate(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {
                trace!("Already idle.");
                return;
            }
            Phase::Running { token, handle } => {
                token.cancel();
                self.phase = Phase::Stopping { handle };
            }
            Phase::Stopping { handle } => {
                self.phase = Phase::Stopping { handle };
            }
        }

        if let Phase::Stopping { handle } = &mut self.phase {
            match handle.await {
                Ok(Ok(())) => info!("Stopped."),
                Ok(Err(e)) => warn!("Sampling had already failed. Error: {}", e),
                Err(e) => error!("Sampling task did not stop cleanly. Error: {}", e),
            }
        }
        self.phase = Phase::Idle;
    }

    /// Wait for the running task to end on its own. Returns immediately when
    /// idle. Cancel safe: dropping the future leaves the task running.
    pub async fn wait(&mut self) -> Result<(), SamplingError> {
        let outcome = match &mut self.phase {
            Phase::Idle => return Ok(()),
            Phase::Running { handle, .. } | Phase::Stopping { handle } => handle.await,
        };
        self.phase = Phase::Idle;
        Ok(outcome??)
    }

    fn ensure_idle(&self) -> Result<(), ActivationError> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::Running { .. } => Err(ActivationError::AlreadyActive),
            Phase::Stopping { .. } => Err(ActivationError::StillStopping),
        }
    }
}

/// Task: Keep sampling enabled until cancelled. Stands in for the component
/// lifecycle manager: a link failure puts the sampler in a fault wait and it
/// is re-activated after `reconnect_interval`. Invalid configuration stops the
/// task with an error since retrying cannot fix it.
#[tracing::instrument(skip_all)]
pub async fn task_supervise_sampling<T>(
    token: CancellationToken,
    config: Config,
    mode: SessionMode,
    telemetry: T,
) -> Result<(), ConfigurationError>
where
    T: TelemetryPort + Clone + Send + Sync + 'static,
{
    info!("Started.");
    let mut sampler = Sampler::new(token.clone(), telemetry);

    while !token.is_cancelled() {
        match sampler.activate(&config, mode).await {
            Ok(()) => {
                info!("Sampling enabled.");
                let cancelled = tokio::select! {
                    biased;
                    _ = token.cancelled() => true,
                    outcome = sampler.wait() => {
                        match outcome {
                            Ok(()) => debug!("Sampling ended."),
                            Err(e) => error!("Sampling fault. Error: {}", e),
                        }
                        false
                    }
                };
                if cancelled {
                    break;
                }
            }
            Err(ActivationError::Configuration(e)) => {
                error!("Refusing to enable sampling. Error: {}", e);
                return Err(e);
            }
            Err(e) => error!("Failed to enable sampling. Error: {}", e),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_interval()) => {
                info!("Retrying activation.");
            }
        };
    }

    warn!("Cancelled.");
    sampler.deactivate().await;
    Ok(())
}
