//! 模拟传输
//!
//! 不打开任何 socket，每次发送后把请求原样加上 `,0` 作为响应，
//! 用于在没有探测器软件的环境下运行控制脚本。

use crate::{NetError, Transport};
use bytes::{Buf, BytesMut};
use tracing::trace;

/// 成功状态后缀
const SUCCESS_SUFFIX: &[u8] = b",0";

/// 模拟传输
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    pending: BytesMut,
    sent: Vec<Vec<u8>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送的全部请求
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self) -> Result<(), NetError> {
        Ok(())
    }

    fn disconnect(&mut self) {
        self.pending.clear();
    }

    fn send(&mut self, data: &[u8]) -> Result<(), NetError> {
        trace!("Simulated TX {}", String::from_utf8_lossy(data));
        self.sent.push(data.to_vec());
        self.pending.clear();
        self.pending.extend_from_slice(data);
        self.pending.extend_from_slice(SUCCESS_SUFFIX);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        if self.pending.is_empty() {
            return Err(NetError::Timeout);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn peer(&self) -> String {
        "simulated".to_string()
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Connection, ConnectionConfig};

    #[test]
    fn test_echo_with_success_suffix() {
        let mut conn = Connection::new(SimulatedTransport::new());
        let response = conn.exchange(b"MPX,0000000015,SET,HVBIAS,120").unwrap();
        assert_eq!(&response[..], b"MPX,0000000015,SET,HVBIAS,120,0");
        assert_eq!(conn.transport().sent().len(), 1);
    }

    #[test]
    fn test_small_capacity_reads_whole_echo() {
        let config = ConnectionConfig {
            recv_capacity: 29,
            ..Default::default()
        };
        let mut conn = Connection::with_config(SimulatedTransport::new(), config);
        for _ in 0..2 {
            let response = conn.exchange(b"MPX,0000000015,SET,HVBIAS,121").unwrap();
            assert_eq!(&response[..], b"MPX,0000000015,SET,HVBIAS,121,0");
        }
    }

    #[test]
    fn test_receive_without_request_times_out() {
        let mut transport = SimulatedTransport::new();
        let mut buf = [0u8; 16];
        assert!(transport.receive(&mut buf).unwrap_err().is_timeout());
    }
}
