use rand_core::RngCore;

use super::{Endpoint, Socket, Transport};
use crate::Error;
use crate::ws::{Key, Opcode, WsError, frame, handshake};

/// Large enough to hold any upgrade reply `verify_response` accepts.
const RX_CAPACITY: usize = handshake::MAX_RESPONSE_SIZE;
/// Largest payload `send_text` accepts in one frame.
pub const MAX_FRAME_PAYLOAD: usize = 256;
const TX_CAPACITY: usize = frame::encoded_len(MAX_FRAME_PAYLOAD);
/// Control frame payloads are limited to 125 bytes by RFC 6455.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// Where the connection is in its lifecycle.
///
/// `Connecting` and `Handshaking` fall back to `Connecting` on failure so the
/// first connection is retried by later pumps. Once `Open` has been reached a
/// lost connection ends in `Closed`, which is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    Connecting,
    Handshaking,
    Open,
    Closed,
}

/// WebSocket client over any [`Socket`].
///
/// `rng` supplies the handshake nonce and a fresh masking key per frame, so
/// it should be the board's hardware RNG.
pub struct WebSocket<S, R> {
    socket: S,
    rng: R,
    endpoint: Option<Endpoint<'static>>,
    state: LinkState,
    key: Key,
    rx: [u8; RX_CAPACITY],
    rx_len: usize,
}

impl<S: Socket, R: RngCore> WebSocket<S, R> {
    pub fn new(socket: S, rng: R) -> Self {
        Self {
            socket,
            rng,
            endpoint: None,
            state: LinkState::Idle,
            key: Key::new([0; 16]),
            rx: [0; RX_CAPACITY],
            rx_len: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    async fn open(&mut self, endpoint: Endpoint<'static>) -> Result<(), Error> {
        self.socket.open(&endpoint).await?;

        let mut nonce = [0u8; 16];
        self.rng.fill_bytes(&mut nonce);
        self.key = Key::new(nonce);

        let request = handshake::request(&endpoint, &self.key)?;
        self.socket.write_all(request.as_bytes()).await
    }

    async fn finish_handshake(&mut self) -> Result<(), Error> {
        self.fill_rx().await?;

        if let Some(used) = handshake::verify_response(&self.rx[..self.rx_len], &self.key)? {
            self.consume(used);
            self.state = LinkState::Open;
            info!("websocket open");
        }

        Ok(())
    }

    async fn drain_frames(&mut self) -> Result<(), Error> {
        self.fill_rx().await?;

        while self.state == LinkState::Open {
            let mut control = [0u8; MAX_CONTROL_PAYLOAD];

            let (opcode, control_len, used) = match frame::decode(&self.rx[..self.rx_len])? {
                Some((frame, used)) => {
                    let len = if frame.opcode.is_control() {
                        let len = frame.payload.len().min(MAX_CONTROL_PAYLOAD);
                        control[..len].copy_from_slice(&frame.payload[..len]);
                        len
                    } else {
                        trace!(
                            "ignoring {:?} frame of {} bytes",
                            frame.opcode,
                            frame.payload.len()
                        );
                        0
                    };
                    (frame.opcode, len, used)
                }
                None if self.rx_len == RX_CAPACITY => {
                    return Err(WsError::PayloadTooLarge(self.rx_len as u64).into());
                }
                None => break,
            };

            self.consume(used);

            match opcode {
                Opcode::Ping => {
                    self.send_frame(Opcode::Pong, &control[..control_len]).await?;
                }
                Opcode::Close => {
                    // echo the status code, then stop
                    let echo = control_len.min(2);
                    let _ = self.send_frame(Opcode::Close, &control[..echo]).await;
                    self.socket.close();
                    self.state = LinkState::Closed;
                    warn!("server closed the websocket");
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn fill_rx(&mut self) -> Result<(), Error> {
        while self.rx_len < RX_CAPACITY {
            let n = self.socket.read_available(&mut self.rx[self.rx_len..]).await?;
            if n == 0 {
                break;
            }
            self.rx_len += n;
        }

        Ok(())
    }

    fn consume(&mut self, used: usize) {
        self.rx.copy_within(used..self.rx_len, 0);
        self.rx_len -= used;
    }

    async fn send_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), Error> {
        let mut buf = [0u8; TX_CAPACITY];
        let mask = self.rng.next_u32().to_le_bytes();
        let used = frame::encode(opcode, payload, mask, &mut buf)?;

        self.socket.write_all(&buf[..used]).await
    }

    fn fail(&mut self) {
        self.socket.abort();
        self.rx_len = 0;
        self.state = match self.state {
            LinkState::Open | LinkState::Closed => LinkState::Closed,
            _ => LinkState::Connecting,
        };
    }
}

impl<S: Socket, R: RngCore> Transport for WebSocket<S, R> {
    async fn connect(&mut self, endpoint: Endpoint<'static>) -> Result<(), Error> {
        if self.endpoint.is_some() {
            warn!("transport already opened, ignoring second connect");
            return Ok(());
        }

        endpoint.validate()?;
        self.endpoint = Some(endpoint);
        self.state = LinkState::Connecting;

        Ok(())
    }

    async fn pump(&mut self) {
        let result = match self.state {
            LinkState::Idle | LinkState::Closed => return,
            LinkState::Connecting => {
                let Some(endpoint) = self.endpoint else {
                    return;
                };

                self.open(endpoint).await.map(|()| {
                    debug!("upgrade request sent to {}:{}", endpoint.host, endpoint.port);
                    self.state = LinkState::Handshaking;
                })
            }
            LinkState::Handshaking => self.finish_handshake().await,
            LinkState::Open => self.drain_frames().await,
        };

        if let Err(e) = result {
            warn!("websocket {:?} failed: {:?}", self.state, e);
            self.fail();
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), Error> {
        if self.state != LinkState::Open {
            return Err(Error::NotConnected);
        }

        if let Err(e) = self.send_frame(Opcode::Text, text.as_bytes()).await {
            self.fail();
            return Err(e);
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == LinkState::Open
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use embassy_futures::block_on;

    use super::*;

    const ENDPOINT: Endpoint<'static> = Endpoint {
        host: "192.168.2.189",
        port: 8080,
        path: "/",
    };

    #[derive(Default)]
    struct Wire {
        /// Queued results for `open`; empty means success.
        open_results: VecDeque<Result<(), Error>>,
        opens: u32,
        aborts: u32,
        connected: bool,
        closed: bool,
        inbound: Vec<u8>,
        writes: Vec<Vec<u8>>,
    }

    #[derive(Clone, Default)]
    struct MockSocket(Rc<RefCell<Wire>>);

    impl Socket for MockSocket {
        async fn open(&mut self, _endpoint: &Endpoint<'_>) -> Result<(), Error> {
            let mut wire = self.0.borrow_mut();
            wire.opens += 1;
            let result = wire.open_results.pop_front().unwrap_or(Ok(()));
            wire.connected = result.is_ok();
            result
        }

        async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            let mut wire = self.0.borrow_mut();
            if !wire.connected {
                return Err(Error::NotConnected);
            }

            let n = buf.len().min(wire.inbound.len());
            buf[..n].copy_from_slice(&wire.inbound[..n]);
            wire.inbound.drain(..n);
            Ok(n)
        }

        async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
            let mut wire = self.0.borrow_mut();
            if !wire.connected {
                return Err(Error::UnableToSend);
            }
            wire.writes.push(buf.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            let mut wire = self.0.borrow_mut();
            wire.connected = false;
            wire.closed = true;
        }

        fn abort(&mut self) {
            let mut wire = self.0.borrow_mut();
            wire.connected = false;
            wire.aborts += 1;
        }
    }

    /// Deterministic stand-in for the board RNG.
    struct CountingRng(u8);

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            let mut bytes = [0u8; 4];
            self.fill_bytes(&mut bytes);
            u32::from_le_bytes(bytes)
        }

        fn next_u64(&mut self) -> u64 {
            let mut bytes = [0u8; 8];
            self.fill_bytes(&mut bytes);
            u64::from_le_bytes(bytes)
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for byte in dst {
                self.0 = self.0.wrapping_add(1);
                *byte = self.0;
            }
        }
    }

    type Client = WebSocket<MockSocket, CountingRng>;

    fn client() -> (Client, Rc<RefCell<Wire>>) {
        let socket = MockSocket::default();
        let wire = socket.0.clone();
        (WebSocket::new(socket, CountingRng(0)), wire)
    }

    fn upgrade_reply(ws: &Client) -> Vec<u8> {
        let accept = handshake::accept_key(ws.key.as_str());
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            core::str::from_utf8(&accept).unwrap()
        )
        .into_bytes()
    }

    /// Drive a fresh client to `Open`.
    fn open_client() -> (Client, Rc<RefCell<Wire>>) {
        let (mut ws, wire) = client();

        block_on(async {
            ws.connect(ENDPOINT).await.unwrap();
            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Handshaking);

            let reply = upgrade_reply(&ws);
            wire.borrow_mut().inbound.extend_from_slice(&reply);
            ws.pump().await;
        });

        assert_eq!(ws.state(), LinkState::Open);
        wire.borrow_mut().writes.clear();
        (ws, wire)
    }

    /// Opcode byte and unmasked payload of a client frame.
    fn unframe(bytes: &[u8]) -> (u8, Vec<u8>) {
        assert_eq!(bytes[1] & 0x80, 0x80, "client frames must be masked");
        let len = (bytes[1] & 0x7F) as usize;
        let mask = &bytes[2..6];
        let payload = bytes[6..6 + len]
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i & 3])
            .collect();
        (bytes[0], payload)
    }

    #[test]
    fn upgrade_request_goes_out_on_first_pump() {
        let (mut ws, wire) = client();

        block_on(async {
            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Idle);
            assert_eq!(wire.borrow().opens, 0);

            ws.connect(ENDPOINT).await.unwrap();
            ws.pump().await;
        });

        let wire = wire.borrow();
        assert_eq!(wire.opens, 1);
        let request = core::str::from_utf8(&wire.writes[0]).unwrap();
        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(request.contains(ws.key.as_str()));
    }

    #[test]
    fn failed_first_connect_is_retried() {
        let (mut ws, wire) = client();
        wire.borrow_mut()
            .open_results
            .push_back(Err(Error::ServerNotFound));

        block_on(async {
            ws.connect(ENDPOINT).await.unwrap();

            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Connecting);
            assert_eq!(wire.borrow().aborts, 1);

            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Handshaking);
        });

        assert_eq!(wire.borrow().opens, 2);
    }

    #[test]
    fn second_connect_is_ignored() {
        let (mut ws, _wire) = client();
        let other = Endpoint {
            host: "example.org",
            ..ENDPOINT
        };

        block_on(async {
            ws.connect(ENDPOINT).await.unwrap();
            ws.connect(other).await.unwrap();
        });

        assert_eq!(ws.endpoint, Some(ENDPOINT));
    }

    #[test]
    fn wrong_accept_key_retries_from_scratch() {
        let (mut ws, wire) = client();

        block_on(async {
            ws.connect(ENDPOINT).await.unwrap();
            ws.pump().await;

            wire.borrow_mut().inbound.extend_from_slice(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
            );
            ws.pump().await;
        });

        assert_eq!(ws.state(), LinkState::Connecting);
        assert_eq!(wire.borrow().aborts, 1);
    }

    #[test]
    fn unterminated_reply_does_not_stall_the_handshake() {
        let (mut ws, wire) = client();

        block_on(async {
            ws.connect(ENDPOINT).await.unwrap();
            ws.pump().await;

            let mut reply = b"HTTP/1.1 101 Switching Protocols\r\nX-Pad: ".to_vec();
            reply.resize(handshake::MAX_RESPONSE_SIZE, b'a');
            wire.borrow_mut().inbound.extend_from_slice(&reply);

            ws.pump().await;
        });

        assert_eq!(ws.state(), LinkState::Connecting);
        assert_eq!(wire.borrow().aborts, 1);
    }

    #[test]
    fn send_text_needs_an_open_link() {
        let (mut ws, _wire) = client();

        block_on(async {
            assert_eq!(ws.send_text("x").await, Err(Error::NotConnected));

            ws.connect(ENDPOINT).await.unwrap();
            assert_eq!(ws.send_text("x").await, Err(Error::NotConnected));

            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Handshaking);
            assert_eq!(ws.send_text("x").await, Err(Error::NotConnected));
        });

        assert!(!ws.is_connected());
    }

    #[test]
    fn open_link_sends_masked_text() {
        let (mut ws, wire) = open_client();
        let text = r#"{"analog":300,"hall_mT":150}"#;

        block_on(async {
            ws.send_text(text).await.unwrap();
            ws.send_text(text).await.unwrap();
        });

        let wire = wire.borrow();
        assert_eq!(wire.writes.len(), 2);
        for frame in &wire.writes {
            assert_eq!(unframe(frame), (0x81, text.as_bytes().to_vec()));
        }
        // a new masking key per frame
        assert_ne!(wire.writes[0][2..6], wire.writes[1][2..6]);
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let (mut ws, wire) = open_client();
        wire.borrow_mut()
            .inbound
            .extend_from_slice(&[0x89, 0x02, b'h', b'i']);

        block_on(ws.pump());

        assert_eq!(ws.state(), LinkState::Open);
        let wire = wire.borrow();
        assert_eq!(wire.writes.len(), 1);
        assert_eq!(unframe(&wire.writes[0]), (0x8A, b"hi".to_vec()));
    }

    #[test]
    fn data_frames_from_the_server_are_ignored() {
        let (mut ws, wire) = open_client();
        wire.borrow_mut()
            .inbound
            .extend_from_slice(&[0x81, 0x03, b'a', b'c', b'k']);

        block_on(ws.pump());

        assert_eq!(ws.state(), LinkState::Open);
        assert!(wire.borrow().writes.is_empty());
    }

    #[test]
    fn close_is_echoed_and_final() {
        let (mut ws, wire) = open_client();
        // 1000, normal closure, with a reason
        wire.borrow_mut()
            .inbound
            .extend_from_slice(&[0x88, 0x04, 0x03, 0xE8, b'b', b'y']);

        block_on(async {
            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Closed);

            ws.pump().await;
            assert_eq!(ws.send_text("x").await, Err(Error::NotConnected));
        });

        let wire = wire.borrow();
        assert!(wire.closed);
        assert_eq!(wire.opens, 1);
        assert_eq!(wire.writes.len(), 1);
        assert_eq!(unframe(&wire.writes[0]), (0x88, vec![0x03, 0xE8]));
    }

    #[test]
    fn lost_link_after_open_is_final() {
        let (mut ws, wire) = open_client();
        wire.borrow_mut().connected = false;

        block_on(async {
            ws.pump().await;
            assert_eq!(ws.state(), LinkState::Closed);

            ws.pump().await;
            ws.pump().await;
        });

        assert_eq!(ws.state(), LinkState::Closed);
        assert_eq!(wire.borrow().opens, 1);
        assert!(!ws.is_connected());
    }

    #[test]
    fn protocol_violation_closes_the_link() {
        let (mut ws, wire) = open_client();
        // masked server frame
        wire.borrow_mut()
            .inbound
            .extend_from_slice(&[0x81, 0x81, 0, 0, 0, 0, b'x']);

        block_on(ws.pump());

        assert_eq!(ws.state(), LinkState::Closed);
        assert_eq!(wire.borrow().aborts, 1);
    }
}
