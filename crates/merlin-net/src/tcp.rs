//! TCP 传输
//!
//! 阻塞式 `TcpStream`，连接、读、写分别带超时。

use crate::{NetError, Transport};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// TCP 连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP 传输
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, NetError> {
        self.stream.as_mut().ok_or(NetError::NotConnected)
    }
}

/// 按超时逐个尝试解析出的地址
pub(crate) fn connect_stream(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, NetError> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs().map_err(NetError::Io)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(NetError::from_io(e)),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        NetError::Io(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("no address resolved for {host}"),
        ))
    }))
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), NetError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = connect_stream(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        )?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.write_timeout))?;
        stream.set_nodelay(true)?;
        debug!("TCP connected to {}", self.config.addr());
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            // 对端可能已经关闭，忽略 shutdown 错误
            let _ = stream.shutdown(Shutdown::Both);
            debug!("TCP disconnected from {}", self.config.addr());
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), NetError> {
        let stream = self.stream()?;
        stream.write_all(data).map_err(NetError::from_io)?;
        stream.flush().map_err(NetError::from_io)?;
        trace!("TX {} bytes", data.len());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let stream = self.stream()?;
        match stream.read(buf) {
            Ok(0) => Err(NetError::Closed),
            Ok(n) => {
                trace!("RX {} bytes", n);
                Ok(n)
            },
            Err(e) => Err(NetError::from_io(e)),
        }
    }

    fn peer(&self) -> String {
        self.config.addr()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
