//! 连接管理
//!
//! 状态机：
//!
//! ```text
//! Unconnected --connect/send--> Connected
//! Connected --send 超时--> Unconnected --> Connected（仅一次）--> 重发一次
//! ```
//!
//! 第二次失败以 `NetError::ConnectionFailed` 返回。接收端按帧前缀中的声明长度
//! 循环读取，直到收全或对端关闭；回显式回复还要等到结尾的状态字段。
//! 没有前缀的回复按单次读取结果返回。读超时后连接断开，下一个请求重新连接。

use crate::{NetError, Transport};
use bytes::{Bytes, BytesMut};
use merlin_protocol::{FrameProgress, reply_progress};
use tracing::{debug, info, trace, warn};

/// 接收缓冲区默认容量（单次读取上限）
pub const DEFAULT_RECV_CAPACITY: usize = 1000;
/// 单个响应默认最大字节数
pub const DEFAULT_MAX_RESPONSE_LEN: usize = 1024 * 1024;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
}

/// 连接参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// 单次读取的缓冲区容量
    pub recv_capacity: usize,
    /// 单个响应的最大字节数
    pub max_response_len: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            recv_capacity: DEFAULT_RECV_CAPACITY,
            max_response_len: DEFAULT_MAX_RESPONSE_LEN,
        }
    }
}

/// 连接管理器
///
/// 持有一个传输对象，负责按需连接、发送超时后的单次重连重发，以及响应重组。
/// 本身不加锁，串行化由上层（`CommandClient` 的互斥锁）保证。
pub struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
    config: ConnectionConfig,
    reconnects: u64,
}

impl<T: Transport> Connection<T> {
    /// 创建连接（初始为未连接状态）
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ConnectionConfig::default())
    }

    pub fn with_config(transport: T, config: ConnectionConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Unconnected,
            config,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// 累计自动重连次数
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects
    }

    /// 显式连接（已连接时无操作）
    ///
    /// # 错误
    /// - `NetError::ConnectionFailed`: 底层连接失败
    pub fn connect(&mut self) -> Result<(), NetError> {
        if self.is_connected() {
            return Ok(());
        }
        match self.transport.connect() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                info!("Connected to {}", self.transport.peer());
                Ok(())
            },
            Err(e) => {
                self.transport.disconnect();
                warn!("Failed to connect to {}: {}", self.transport.peer(), e);
                Err(NetError::connection_failed(self.transport.peer(), e))
            },
        }
    }

    /// 断开连接
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            debug!("Disconnecting from {}", self.transport.peer());
        }
        self.transport.disconnect();
        self.state = ConnectionState::Unconnected;
    }

    /// 发送一帧
    ///
    /// 未连接时先连接。写超时时断开、重连一次并重发一次；
    /// 其他传输错误立即返回，连接标记为未连接。
    pub fn send(&mut self, data: &[u8]) -> Result<(), NetError> {
        self.connect()?;

        match self.transport.send(data) {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => {
                warn!(
                    "Send to {} timed out, reconnecting once",
                    self.transport.peer()
                );
                self.disconnect();
                self.reconnects += 1;
                self.connect()?;
                self.transport.send(data).map_err(|e| {
                    self.disconnect();
                    warn!("Retry send to {} failed: {}", self.transport.peer(), e);
                    NetError::connection_failed(self.transport.peer(), e)
                })
            },
            Err(e) => {
                self.disconnect();
                Err(e)
            },
        }
    }

    /// 接收一个完整响应
    ///
    /// 按 `recv_capacity` 分块读取，直到收满帧前缀声明的长度；
    /// 没有帧前缀的回复直接返回首次读取的内容。对端在收到部分数据后关闭时，
    /// 返回已收到的字节，由上层判断内容是否完整。
    ///
    /// # 错误
    /// - `NetError::NotConnected`: 尚未连接
    /// - `NetError::Timeout`: 读超时（不重试，连接断开）
    /// - `NetError::Closed`: 未收到任何字节时对端关闭
    /// - `NetError::ResponseTooLarge`: 超出 `max_response_len`
    pub fn receive(&mut self) -> Result<Bytes, NetError> {
        self.receive_reply(&[])
    }

    /// 接收对 `request` 的回复
    ///
    /// 与 [`receive`](Self::receive) 相同，另外对回显式回复（以请求开头）
    /// 继续读取，直到请求之后的 `,<状态>` 也已到达。
    ///
    /// 读超时后断开连接：迟到的回复留在旧 socket 上，不会被下一个请求读到。
    pub fn receive_reply(&mut self, request: &[u8]) -> Result<Bytes, NetError> {
        if !self.is_connected() {
            return Err(NetError::NotConnected);
        }

        let mut chunk = vec![0u8; self.config.recv_capacity.max(1)];
        let mut buf = BytesMut::new();

        loop {
            let n = match self.transport.receive(&mut chunk) {
                Ok(n) => n,
                Err(NetError::Closed) if !buf.is_empty() => {
                    debug!("Peer closed after {} bytes", buf.len());
                    self.disconnect();
                    return Ok(buf.freeze());
                },
                Err(e) => {
                    if e.is_timeout() {
                        warn!(
                            "Receive from {} timed out after {} bytes, dropping connection",
                            self.transport.peer(),
                            buf.len()
                        );
                    }
                    self.disconnect();
                    return Err(e);
                },
            };

            buf.extend_from_slice(&chunk[..n]);
            if buf.len() > self.config.max_response_len {
                self.disconnect();
                return Err(NetError::ResponseTooLarge {
                    limit: self.config.max_response_len,
                });
            }

            match reply_progress(request, &buf) {
                FrameProgress::Complete | FrameProgress::Unframed => {
                    trace!("Received {} bytes", buf.len());
                    return Ok(buf.freeze());
                },
                FrameProgress::NeedPrefix => {},
                FrameProgress::Incomplete { missing } => {
                    trace!("Response incomplete, {} bytes missing", missing);
                },
            }
        }
    }

    /// 发送并接收一次
    pub fn exchange(&mut self, data: &[u8]) -> Result<Bytes, NetError> {
        self.send(data)?;
        self.receive_reply(data)
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.transport.peer())
            .field("state", &self.state)
            .field("reconnects", &self.reconnects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// 按脚本返回结果的传输，记录连接和发送次数
    #[derive(Default)]
    struct ScriptedTransport {
        connects: usize,
        disconnects: usize,
        sends: usize,
        send_script: VecDeque<Result<(), NetError>>,
        recv_script: VecDeque<Result<Vec<u8>, NetError>>,
        fail_connect: bool,
    }

    impl Transport for ScriptedTransport {
        fn connect(&mut self) -> Result<(), NetError> {
            self.connects += 1;
            if self.fail_connect {
                return Err(NetError::Timeout);
            }
            Ok(())
        }

        fn disconnect(&mut self) {
            self.disconnects += 1;
        }

        fn send(&mut self, _data: &[u8]) -> Result<(), NetError> {
            self.sends += 1;
            self.send_script.pop_front().unwrap_or(Ok(()))
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
            match self.recv_script.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                },
                Some(Err(e)) => Err(e),
                None => Err(NetError::Closed),
            }
        }

        fn peer(&self) -> String {
            "scripted".to_string()
        }
    }

    #[test]
    fn test_lazy_connect_on_send() {
        let mut conn = Connection::new(ScriptedTransport::default());
        assert_eq!(conn.state(), ConnectionState::Unconnected);
        conn.send(b"MPX,0000000009,GET,TEST").unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.transport().connects, 1);

        // 已连接时不重复连接
        conn.send(b"MPX,0000000009,GET,TEST").unwrap();
        assert_eq!(conn.transport().connects, 1);
        assert_eq!(conn.reconnect_count(), 0);
    }

    #[test]
    fn test_timeout_once_then_success() {
        let transport = ScriptedTransport {
            send_script: VecDeque::from([Err(NetError::Timeout), Ok(())]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        conn.send(b"data").unwrap();

        assert_eq!(conn.reconnect_count(), 1);
        assert_eq!(conn.transport().connects, 2);
        assert_eq!(conn.transport().sends, 2);
        assert!(conn.is_connected());
    }

    #[test]
    fn test_always_timeout_fails_after_one_reconnect() {
        let transport = ScriptedTransport {
            send_script: VecDeque::from([
                Err(NetError::Timeout),
                Err(NetError::Timeout),
                Err(NetError::Timeout),
            ]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        let err = conn.send(b"data").unwrap_err();

        assert!(matches!(err, NetError::ConnectionFailed { .. }));
        assert_eq!(conn.reconnect_count(), 1);
        assert_eq!(conn.transport().connects, 2);
        assert_eq!(conn.transport().sends, 2);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_other_send_error_propagates_without_retry() {
        let transport = ScriptedTransport {
            send_script: VecDeque::from([Err(NetError::Closed)]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        assert!(matches!(conn.send(b"data"), Err(NetError::Closed)));
        assert_eq!(conn.transport().sends, 1);
        assert_eq!(conn.reconnect_count(), 0);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_initial_connect_failure() {
        let transport = ScriptedTransport {
            fail_connect: true,
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        let err = conn.send(b"data").unwrap_err();
        assert!(matches!(err, NetError::ConnectionFailed { .. }));
        assert_eq!(conn.transport().sends, 0);
    }

    #[test]
    fn test_receive_reassembles_split_response() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([
                Ok(b"MPX,0000".to_vec()),
                Ok(b"000015,SET,HV".to_vec()),
                Ok(b"BIAS,120,0".to_vec()),
            ]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        conn.connect().unwrap();
        let response = conn.receive().unwrap();
        assert_eq!(&response[..], b"MPX,0000000015,SET,HVBIAS,120,0");
    }

    #[test]
    fn test_receive_small_capacity() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([
                Ok(b"MPX,".to_vec()),
                Ok(b"0000".to_vec()),
                Ok(b"0000".to_vec()),
                Ok(b"09,G".to_vec()),
                Ok(b"ET,T".to_vec()),
                Ok(b"EST,".to_vec()),
                Ok(b"0".to_vec()),
            ]),
            ..Default::default()
        };
        let config = ConnectionConfig {
            recv_capacity: 4,
            ..Default::default()
        };
        let mut conn = Connection::with_config(transport, config);
        // 回显到声明长度后继续读取，直到状态字段到达
        assert_eq!(
            &conn.exchange(b"MPX,0000000009,GET,TEST").unwrap()[..],
            b"MPX,0000000009,GET,TEST,0"
        );
    }

    #[test]
    fn test_echo_status_split_at_declared_length() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([
                Ok(b"MPX,0000000015,SET,HVBIAS,120".to_vec()),
                Ok(b",3".to_vec()),
            ]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        let response = conn.exchange(b"MPX,0000000015,SET,HVBIAS,120").unwrap();
        assert_eq!(&response[..], b"MPX,0000000015,SET,HVBIAS,120,3");
        // 状态字段已读走，不会留给下一次交换
        assert!(conn.transport().recv_script.is_empty());
    }

    #[test]
    fn test_receive_unframed_single_read() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([Ok(b"GET,TEST,0".to_vec()), Ok(b"more".to_vec())]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        conn.connect().unwrap();
        assert_eq!(&conn.receive().unwrap()[..], b"GET,TEST,0");
    }

    #[test]
    fn test_receive_peer_close_mid_frame() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([Ok(b"MPX,0000000020,GET".to_vec())]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        conn.connect().unwrap();
        assert_eq!(&conn.receive().unwrap()[..], b"MPX,0000000020,GET");
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_receive_timeout_drops_connection() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([
                Err(NetError::Timeout),
                Ok(b"MPX,0000000009,GET,TEST,0".to_vec()),
            ]),
            ..Default::default()
        };
        let mut conn = Connection::new(transport);
        conn.connect().unwrap();
        assert!(conn.receive().unwrap_err().is_timeout());
        assert!(!conn.is_connected());
        assert_eq!(conn.reconnect_count(), 0);

        // 下一个请求在新连接上进行
        conn.exchange(b"MPX,0000000009,GET,TEST").unwrap();
        assert_eq!(conn.transport().connects, 2);
        assert!(conn.is_connected());
    }

    #[test]
    fn test_receive_bounded() {
        let transport = ScriptedTransport {
            recv_script: VecDeque::from([Ok(b"MPX,0000000100,GET,TEST".to_vec())]),
            ..Default::default()
        };
        let config = ConnectionConfig {
            max_response_len: 16,
            ..Default::default()
        };
        let mut conn = Connection::with_config(transport, config);
        conn.connect().unwrap();
        assert!(matches!(
            conn.receive(),
            Err(NetError::ResponseTooLarge { limit: 16 })
        ));
    }

    #[test]
    fn test_receive_requires_connection() {
        let mut conn = Connection::new(ScriptedTransport::default());
        assert!(matches!(conn.receive(), Err(NetError::NotConnected)));
    }
}
