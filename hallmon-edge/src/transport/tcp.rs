use embassy_net::{
    IpAddress, IpEndpoint, Stack,
    dns::DnsQueryType,
    tcp::{State, TcpSocket},
};
use embassy_time::{Duration, with_timeout};

use super::{Endpoint, Socket};
use crate::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// embassy-net TCP connection.
pub struct TcpLink<'a> {
    stack: Stack<'a>,
    socket: TcpSocket<'a>,
}

impl<'a> TcpLink<'a> {
    pub fn new(stack: Stack<'a>, rx: &'a mut [u8], tx: &'a mut [u8]) -> Self {
        Self {
            stack,
            socket: TcpSocket::new(stack, rx, tx),
        }
    }
}

impl Socket for TcpLink<'_> {
    async fn open(&mut self, endpoint: &Endpoint<'_>) -> Result<(), Error> {
        let addr = resolve(self.stack, endpoint.host).await?;

        with_timeout(
            CONNECT_TIMEOUT,
            self.socket.connect(IpEndpoint::new(addr, endpoint.port)),
        )
        .await
        .map_err(|_| Error::ServerNotFound)?
        .map_err(|_| Error::ServerNotFound)
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.socket.state() != State::Established {
            return Err(Error::NotConnected);
        }

        if !self.socket.can_recv() {
            return Ok(0);
        }

        match self.socket.read(buf).await {
            Ok(0) | Err(_) => Err(Error::NotConnected),
            Ok(n) => Ok(n),
        }
    }

    async fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            let n = self
                .socket
                .write(buf)
                .await
                .map_err(|_| Error::UnableToSend)?;
            if n == 0 {
                return Err(Error::UnableToSend);
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    fn close(&mut self) {
        self.socket.close();
    }

    fn abort(&mut self) {
        self.socket.abort();
    }
}

async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, Error> {
    if let Ok(v4) = host.parse::<core::net::Ipv4Addr>() {
        let [a, b, c, d] = v4.octets();
        return Ok(IpAddress::v4(a, b, c, d));
    }

    let addrs = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|_| Error::ServerNotFound)?;

    addrs.first().copied().ok_or(Error::ServerNotFound)
}
