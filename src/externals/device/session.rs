use std::io;

use derive_more::Display;
use thiserror::Error;
use tokio::net::lookup_host;
use tokio_modbus::{
    client::{tcp, Client, Context, Reader},
    ExceptionCode, Slave,
};
use tracing::{debug, error, info, instrument, trace, warn};

use super::simulator::SimulatedController;
use crate::{
    models::{channel::CHANNEL_COUNT, sample::RawSample},
    ports::AnalogInputDevice,
};

/// The ADAM-6024 exposes its analog inputs from register zero.
const FIRST_REGISTER: u16 = 0;

/// Size of the input register block read each cycle. Only the first
/// `CHANNEL_COUNT` registers carry analog inputs.
const REGISTER_COUNT: u16 = 8;

/// Modbus unit id of the controller.
const UNIT_ID: Slave = Slave(1);

/// Network identity of the controller.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display(fmt = "{}:{}", host, port)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Why the controller could not be reached.
#[derive(Error, Debug)]
pub enum LinkFailure {
    #[error("Failed to resolve address. Error: {0}")]
    Resolve(#[source] io::Error),

    #[error("Address did not resolve to any socket.")]
    NoAddress,

    #[error("Failed to connect. Error: {0}")]
    Connect(#[source] io::Error),

    #[error("Session is not connected.")]
    NotConnected,

    #[error("Transport fault. Error: {0}")]
    Transport(#[source] tokio_modbus::Error),

    #[error("Device answered with exception {0}.")]
    Exception(ExceptionCode),

    #[error("Device returned {received} registers, expected at least {expected}.")]
    MalformedResponse { expected: usize, received: usize },
}

/// The controller is unreachable. Every transport level problem, including
/// responses that look successful but carry no usable payload, ends up here.
#[derive(Error, Debug)]
#[error("Modbus device at {endpoint} is unavailable. {failure}")]
pub struct LinkError {
    pub endpoint: DeviceEndpoint,
    pub failure: LinkFailure,
}

impl LinkError {
    pub fn new(endpoint: DeviceEndpoint, failure: LinkFailure) -> Self {
        Self { endpoint, failure }
    }
}

/// Whether to talk to real hardware or to the in-process simulator.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Hardware,
    Simulated,
}

impl From<bool> for SessionMode {
    fn from(simulated: bool) -> Self {
        if simulated {
            SessionMode::Simulated
        } else {
            SessionMode::Hardware
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

enum Transport {
    Modbus(Context),
    Simulated(SimulatedController),
}

/// Exclusive connection to one controller.
pub struct DeviceSession {
    endpoint: DeviceEndpoint,
    transport: Option<Transport>,
}

impl DeviceSession {
    /// Open a session to `endpoint`. In simulated mode no network traffic
    /// happens and the endpoint is only kept for diagnostics.
    #[instrument(skip_all, fields(endpoint = %endpoint, mode = %mode))]
    pub async fn connect(endpoint: DeviceEndpoint, mode: SessionMode) -> Result<Self, LinkError> {
        let transport = match mode {
            SessionMode::Simulated => Transport::Simulated(SimulatedController::new()),
            SessionMode::Hardware => match open_modbus_context(&endpoint).await {
                Ok(context) => Transport::Modbus(context),
                Err(failure) => {
                    error!("Failed to open modbus connection. Error: {}", failure);
                    return Err(LinkError::new(endpoint, failure));
                }
            },
        };
        info!("Connected.");

        Ok(Self {
            endpoint,
            transport: Some(transport),
        })
    }

    /// Open a session backed by a specific simulator instance.
    pub fn with_simulator(endpoint: DeviceEndpoint, controller: SimulatedController) -> Self {
        Self {
            endpoint,
            transport: Some(Transport::Simulated(controller)),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.transport {
            Some(_) => SessionState::Connected,
            None => SessionState::Disconnected,
        }
    }
}

impl AnalogInputDevice for DeviceSession {
    #[instrument(skip_all)]
    async fn read_all(&mut self) -> Result<RawSample, LinkError> {
        let response = match self.transport.as_mut() {
            None => {
                return Err(LinkError::new(
                    self.endpoint.clone(),
                    LinkFailure::NotConnected,
                ))
            }
            Some(Transport::Modbus(context)) => {
                context
                    .read_input_registers(FIRST_REGISTER, REGISTER_COUNT)
                    .await
            }
            Some(Transport::Simulated(controller)) => Ok(Ok(
                controller.read_input_registers(FIRST_REGISTER, REGISTER_COUNT)
            )),
        };

        match classify_response(response) {
            Ok(sample) => {
                trace!("Read {}.", sample);
                Ok(sample)
            }
            Err(failure) => {
                warn!("Failed to read input registers. Error: {}", failure);
                Err(LinkError::new(self.endpoint.clone(), failure))
            }
        }
    }

    #[instrument(skip_all)]
    async fn disconnect(&mut self) {
        match self.transport.take() {
            None => trace!("Already disconnected."),
            Some(Transport::Simulated(_)) => debug!("Released simulated controller."),
            Some(Transport::Modbus(mut context)) => match context.disconnect().await {
                Ok(_) => info!("Disconnected from {}.", self.endpoint),
                Err(e) => warn!(
                    "Failed to cleanly disconnect from {}. Ignoring. Error: {}",
                    self.endpoint, e
                ),
            },
        }
    }
}

async fn open_modbus_context(endpoint: &DeviceEndpoint) -> Result<Context, LinkFailure> {
    let socket_addr = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(LinkFailure::Resolve)?
        .next()
        .ok_or(LinkFailure::NoAddress)?;
    debug!("Resolved {} to {}.", endpoint, socket_addr);

    tcp::connect_slave(socket_addr, UNIT_ID)
        .await
        .map_err(LinkFailure::Connect)
}

/// Normalize a register read into either a sample or a link failure.
///
/// The transport can fail outright, the device can answer with an exception,
/// or it can answer "successfully" with too few registers. All three mean the
/// link is not delivering data.
pub(crate) fn classify_response(
    response: tokio_modbus::Result<Vec<u16>>,
) -> Result<RawSample, LinkFailure> {
    match response {
        Err(e) => Err(LinkFailure::Transport(e)),
        Ok(Err(code)) => Err(LinkFailure::Exception(code)),
        Ok(Ok(registers)) => {
            RawSample::from_registers(&registers).ok_or(LinkFailure::MalformedResponse {
                expected: CHANNEL_COUNT,
                received: registers.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use futures::future;
    use tokio_modbus::{
        server::tcp::{accept_tcp_connection, Server},
        Request, Response,
    };

    use super::*;
    use crate::externals::device::simulator::stepping_clock;

    fn endpoint() -> DeviceEndpoint {
        DeviceEndpoint::new("fakeIP", 502)
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(endpoint().to_string(), "fakeIP:502");
    }

    #[test]
    fn test_session_mode_from_flag() {
        assert_eq!(SessionMode::from(true), SessionMode::Simulated);
        assert_eq!(SessionMode::from(false), SessionMode::Hardware);
    }

    #[test]
    fn test_classify_full_response() {
        let sample = classify_response(Ok(Ok(vec![1, 2, 3, 4, 5, 6, 7, 8]))).unwrap();
        assert_eq!(sample.counts, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_classify_short_payload_as_link_failure() {
        let failure = classify_response(Ok(Ok(vec![]))).unwrap_err();
        assert!(matches!(
            failure,
            LinkFailure::MalformedResponse {
                expected: 6,
                received: 0
            }
        ));

        let failure = classify_response(Ok(Ok(vec![1, 2, 3]))).unwrap_err();
        assert!(matches!(
            failure,
            LinkFailure::MalformedResponse { received: 3, .. }
        ));
    }

    #[test]
    fn test_classify_exception_as_link_failure() {
        let failure =
            classify_response(Ok(Err(ExceptionCode::IllegalDataAddress))).unwrap_err();
        assert!(matches!(failure, LinkFailure::Exception(_)));
    }

    #[test]
    fn test_classify_transport_fault_as_link_failure() {
        let fault = tokio_modbus::Error::Transport(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "connection reset",
        ));
        let failure = classify_response(Err(fault)).unwrap_err();
        assert!(matches!(failure, LinkFailure::Transport(_)));
    }

    #[tokio::test]
    async fn test_simulated_session_reads_fixed_channels() {
        let mut session = DeviceSession::connect(endpoint(), SessionMode::Simulated)
            .await
            .expect("Failed to open simulated session.");
        assert_eq!(session.state(), SessionState::Connected);

        let volts = session.read_all().await.unwrap().voltages();
        assert!((volts[1].value() + 10.0).abs() < 1e-3);
        assert!((volts[2].value() - 10.0).abs() < 1e-3);
        assert!(volts[3].value().abs() < 1e-3);
        assert!(volts[4].value().abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_simulated_session_is_live() {
        let mut session = DeviceSession::with_simulator(
            endpoint(),
            SimulatedController::with_clock(stepping_clock(1.0, 2.0)),
        );
        let first = session.read_all().await.unwrap();
        let second = session.read_all().await.unwrap();
        assert_ne!(first.counts[0], second.counts[0]);
        assert_ne!(first.counts[5], second.counts[5]);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut session =
            DeviceSession::with_simulator(endpoint(), SimulatedController::with_clock(|| 0.0));
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_read_after_disconnect_is_link_error() {
        let mut session =
            DeviceSession::with_simulator(endpoint(), SimulatedController::with_clock(|| 0.0));
        session.disconnect().await;

        let error = session.read_all().await.unwrap_err();
        assert_eq!(error.endpoint, endpoint());
        assert!(matches!(error.failure, LinkFailure::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_refused_is_link_error() {
        // Grab a free port and release it so nothing is listening there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let target = DeviceEndpoint::new("127.0.0.1", port);

        let error = match DeviceSession::connect(target.clone(), SessionMode::Hardware).await {
            Ok(_) => panic!("Connected to a port with no listener."),
            Err(e) => e,
        };
        assert_eq!(error.endpoint, target);
        assert!(matches!(error.failure, LinkFailure::Connect(_)));
    }

    /// Controller on localhost that gives the same answer to every input
    /// register read.
    #[derive(Clone)]
    struct FixedAnswer(Result<Vec<u16>, ExceptionCode>);

    impl tokio_modbus::server::Service for FixedAnswer {
        type Request = Request<'static>;
        type Response = Response;
        type Exception = ExceptionCode;
        type Future = future::Ready<Result<Self::Response, Self::Exception>>;

        fn call(&self, req: Self::Request) -> Self::Future {
            let answer = match req {
                Request::ReadInputRegisters(_, _) => {
                    self.0.clone().map(Response::ReadInputRegisters)
                }
                _ => Err(ExceptionCode::IllegalFunction),
            };
            future::ready(answer)
        }
    }

    async fn serve(answer: FixedAnswer) -> DeviceEndpoint {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Server::new(listener);

        tokio::spawn(async move {
            let on_connected = move |stream, socket_addr| {
                let answer = answer.clone();
                async move {
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(answer.clone()))
                    })
                }
            };
            let on_process_error = |err| {
                eprintln!("Test controller error: {}", err);
            };
            let _ = server.serve(&on_connected, on_process_error).await;
        });

        DeviceEndpoint::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_modbus_session_reads_registers() {
        let target = serve(FixedAnswer(Ok(vec![0, 65535, 32767, 32768, 1, 2, 0, 0]))).await;
        let mut session = DeviceSession::connect(target, SessionMode::Hardware)
            .await
            .expect("Failed to connect to local controller.");

        let sample = session.read_all().await.unwrap();
        assert_eq!(sample.counts, [0, 65535, 32767, 32768, 1, 2]);

        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_modbus_exception_is_link_error() {
        let target = serve(FixedAnswer(Err(ExceptionCode::IllegalDataAddress))).await;
        let mut session = DeviceSession::connect(target.clone(), SessionMode::Hardware)
            .await
            .expect("Failed to connect to local controller.");

        let error = session.read_all().await.unwrap_err();
        assert_eq!(error.endpoint, target);
        assert!(matches!(
            error.failure,
            LinkFailure::Exception(ExceptionCode::IllegalDataAddress)
        ));

        session.disconnect().await;
    }
}
