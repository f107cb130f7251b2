use embedded_hal_async::delay::DelayNs;

use crate::AnalogSource;
use crate::Credentials;
use crate::Error;
use crate::MAX_PAYLOAD_SIZE;
use crate::Network;
use crate::Sample;
use crate::TelemetryConfig;
use crate::Transport;

/// What happened to the sample taken in one [`Running::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    /// The transport accepted the message.
    Sent,
    /// The transport refused the message; it is gone.
    Dropped,
    /// No sample could be taken, nothing was sent.
    Skipped,
}

/// Telemetry loop waiting for the network. Call [`Engine::start`] to move on.
pub struct Engine<N, T, A, D> {
    network: N,
    transport: T,
    source: A,
    delay: D,
    config: TelemetryConfig,
}

impl<N, T, A, D> Engine<N, T, A, D>
where
    N: Network,
    T: Transport,
    A: AnalogSource,
    D: DelayNs,
{
    pub fn new(network: N, transport: T, source: A, delay: D, config: TelemetryConfig) -> Self {
        Self {
            network,
            transport,
            source,
            delay,
            config,
        }
    }

    /// Join the network, then open the transport.
    ///
    /// Blocks until association succeeds. Only fails when the association
    /// policy carries a poll limit.
    pub async fn start(
        mut self,
        credentials: &Credentials<'_>,
    ) -> Result<Running<N, T, A, D>, Error> {
        let policy = self.config.association;

        info!("joining network {}", credentials.ssid);
        self.network.begin(credentials).await;

        let mut polls: u32 = 0;
        while !self.network.is_joined().await {
            polls += 1;

            if let Some(max) = policy.max_polls {
                if polls >= max {
                    error!("network not joined after {} polls", polls);
                    return Err(Error::AssociationTimeout { polls });
                }
            }

            self.delay
                .delay_ms(policy.poll_interval.as_millis() as u32)
                .await;
        }

        info!("network joined after {} unsuccessful polls", polls);

        let endpoint = self.config.endpoint;
        if let Err(e) = self.transport.connect(endpoint).await {
            error!(
                "transport to {}:{}{} not opened: {:?}",
                endpoint.host, endpoint.port, endpoint.path, e
            );
        }

        Ok(Running {
            network: self.network,
            transport: self.transport,
            source: self.source,
            delay: self.delay,
            config: self.config,
        })
    }
}

/// Telemetry loop in steady state. There is no way back to [`Engine`].
pub struct Running<N, T, A, D> {
    // kept alive for the lifetime of the link, never polled again
    #[allow(dead_code)]
    network: N,
    transport: T,
    source: A,
    delay: D,
    config: TelemetryConfig,
}

impl<N, T, A, D> Running<N, T, A, D>
where
    N: Network,
    T: Transport,
    A: AnalogSource,
    D: DelayNs,
{
    /// One iteration: pump, sample, send, sleep.
    pub async fn step(&mut self) -> SendOutcome {
        self.transport.pump().await;

        let outcome = match Sample::acquire(
            &mut self.source,
            self.config.analog_channel,
            self.config.hall_channel,
        )
        .await
        {
            Ok(sample) => self.send(&sample).await,
            Err(e) => {
                error!("sensor read failed: {:?}", e);
                SendOutcome::Skipped
            }
        };

        self.delay
            .delay_ms(self.config.send_interval.as_millis() as u32)
            .await;

        outcome
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.step().await;
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send(&mut self, sample: &Sample) -> SendOutcome {
        let mut buf = [0u8; MAX_PAYLOAD_SIZE];

        let payload = match sample.encode(&mut buf) {
            Ok(payload) => payload,
            Err(e) => {
                error!("encoding {:?} failed: {:?}", sample, e);
                return SendOutcome::Dropped;
            }
        };

        match self.transport.send_text(payload).await {
            Ok(()) => {
                trace!("sent {}", payload);
                SendOutcome::Sent
            }
            Err(e) => {
                debug!("sample dropped: {:?}", e);
                SendOutcome::Dropped
            }
        }
    }
}
