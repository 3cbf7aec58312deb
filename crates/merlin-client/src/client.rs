//! 命令客户端
//!
//! 每次请求：编码 → 发送 → 接收 → 解码 → 状态分类。
//! 连接由互斥锁保护，同一时刻只有一个未完成的请求；重连和重发在调用者线程中同步完成。

use crate::acquisition::AcquisitionSettings;
use crate::error::ClientError;
use merlin_net::{Connection, Transport};
use merlin_protocol::{
    Action, CommandFrame, CommandKind, NameMatchInterpreter, PropertyValue, ResponseFrame,
    ResponseInterpreter, ValueKind, property,
};
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 命令客户端
///
/// # Example
///
/// ```
/// use merlin_client::CommandClient;
/// use merlin_net::SimulatedTransport;
///
/// let client = CommandClient::new(SimulatedTransport::new());
/// client.set("HVBIAS", 120).unwrap();
/// ```
pub struct CommandClient<T: Transport = Box<dyn Transport>> {
    connection: Mutex<Connection<T>>,
    interpreter: Box<dyn ResponseInterpreter>,
    settle_delay: Duration,
    peer: String,
    simulated: bool,
}

impl<T: Transport> CommandClient<T> {
    /// 使用默认连接参数创建客户端（不立即连接）
    pub fn new(transport: T) -> Self {
        Self::with_connection(Connection::new(transport))
    }

    pub fn with_connection(connection: Connection<T>) -> Self {
        let peer = connection.transport().peer();
        let simulated = connection.transport().is_simulated();
        Self {
            connection: Mutex::new(connection),
            interpreter: Box::new(NameMatchInterpreter),
            settle_delay: Duration::ZERO,
            peer,
            simulated,
        }
    }

    /// 替换响应解释器
    pub fn with_interpreter(self, interpreter: impl ResponseInterpreter + 'static) -> Self {
        self.with_boxed_interpreter(Box::new(interpreter))
    }

    pub fn with_boxed_interpreter(mut self, interpreter: Box<dyn ResponseInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// 每次请求完成后的等待时间
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// 显示用的对端地址
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// 显式连接（通常不需要，首次请求时自动连接）
    pub fn connect(&self) -> Result<(), ClientError> {
        self.connection.lock().connect()?;
        Ok(())
    }

    pub fn disconnect(&self) {
        self.connection.lock().disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_connected()
    }

    /// 累计自动重连次数
    pub fn reconnect_count(&self) -> u64 {
        self.connection.lock().reconnect_count()
    }

    // ------------------------------------------------------------------------
    // 请求
    // ------------------------------------------------------------------------

    /// 发送一条命令并返回成功的响应
    ///
    /// # 错误
    /// - `ClientError::Protocol`: 参数含分隔符、响应失步等
    /// - `ClientError::Status`: 探测器返回非成功状态（`Busy` 不会自动重试）
    /// - `ClientError::Net`: 传输错误（读超时后连接断开，下一次请求重新连接）
    pub fn request<A: fmt::Display>(
        &self,
        kind: CommandKind,
        name: &str,
        args: &[A],
    ) -> Result<ResponseFrame, ClientError> {
        self.send_frame(&CommandFrame::new(kind, name).with_args(args))
    }

    /// 发送已构造的命令帧
    pub fn send_frame(&self, frame: &CommandFrame) -> Result<ResponseFrame, ClientError> {
        // 编码错误在加锁和网络交互之前返回
        let encoded = frame.encode()?;

        let raw = {
            let mut connection = self.connection.lock();
            debug!("TX {}", frame);
            let raw = connection.exchange(&encoded).inspect_err(|e| {
                warn!("{} failed: {}", frame, e);
            })?;
            if !self.settle_delay.is_zero() {
                spin_sleep::sleep(self.settle_delay);
            }
            raw
        };

        let response = ResponseFrame::new(raw);
        debug!("RX {}", response);
        self.interpreter.classify(frame, &response)?;
        Ok(response)
    }

    pub fn get(&self, name: &str) -> Result<ResponseFrame, ClientError> {
        self.request::<&str>(CommandKind::Get, name, &[])
    }

    pub fn set(&self, name: &str, value: impl fmt::Display) -> Result<ResponseFrame, ClientError> {
        self.request(CommandKind::Set, name, &[value])
    }

    pub fn cmd(&self, name: &str) -> Result<ResponseFrame, ClientError> {
        self.request::<&str>(CommandKind::Cmd, name, &[])
    }

    // ------------------------------------------------------------------------
    // 属性表
    // ------------------------------------------------------------------------

    /// 读取属性并按属性表的值类型解析
    pub fn get_property(&self, name: &str) -> Result<PropertyValue, ClientError> {
        let property =
            property::lookup(name).ok_or_else(|| ClientError::UnknownProperty(name.to_string()))?;
        let response = self.get(property.command)?;
        let fields = response.reply_fields(property.command);
        if fields.is_empty() {
            return Err(ClientError::InvalidValue {
                property: property.command.to_string(),
                reason: format!("no value in reply {:?}", response.text()),
            });
        }
        // 文本值可能本身含分隔符，其余类型只取第一个字段
        let text = match property.kind {
            ValueKind::Text => fields.join(","),
            _ => fields[0].clone(),
        };
        property
            .kind
            .parse(&text)
            .map_err(|e| ClientError::InvalidValue {
                property: property.command.to_string(),
                reason: e.to_string(),
            })
    }

    /// 写入属性（先按属性表校验权限和值类型）
    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), ClientError> {
        let property =
            property::lookup(name).ok_or_else(|| ClientError::UnknownProperty(name.to_string()))?;
        if !property.is_writable() {
            return Err(ClientError::ReadOnlyProperty(property.command));
        }
        let value = property
            .kind
            .coerce(value.into())
            .map_err(|e| ClientError::InvalidValue {
                property: property.command.to_string(),
                reason: e.to_string(),
            })?;
        self.set(property.command, value.to_arg())?;
        Ok(())
    }

    /// 执行动作命令
    pub fn execute(&self, action: Action) -> Result<(), ClientError> {
        info!("Executing {}", action);
        self.cmd(action.command_name())?;
        Ok(())
    }

    pub fn start_acquisition(&self) -> Result<(), ClientError> {
        self.execute(Action::StartAcquisition)
    }

    pub fn stop_acquisition(&self) -> Result<(), ClientError> {
        self.execute(Action::StopAcquisition)
    }

    pub fn soft_trigger(&self) -> Result<(), ClientError> {
        self.execute(Action::SoftTrigger)
    }

    pub fn reset(&self) -> Result<(), ClientError> {
        self.execute(Action::Reset)
    }

    /// 依次写入采集设置，然后开始采集
    ///
    /// 任一设置失败时立即返回，不发送 `STARTACQUISITION`。
    pub fn start_acquisition_with(&self, settings: &AcquisitionSettings) -> Result<(), ClientError> {
        for (name, value) in settings.commands() {
            self.set_property(name, value)?;
        }
        self.start_acquisition()
    }

    pub fn software_version(&self) -> Result<String, ClientError> {
        match self.get_property("SOFTWAREVERSION")? {
            PropertyValue::Text(version) => Ok(version),
            other => Ok(other.to_string()),
        }
    }

    /// 探测器状态（0: 空闲, 1: 忙, 2: 待机）
    pub fn detector_status(&self) -> Result<i64, ClientError> {
        let value = self.get_property("DETECTORSTATUS")?;
        value.as_i64().ok_or_else(|| ClientError::InvalidValue {
            property: "DETECTORSTATUS".to_string(),
            reason: format!("expected integer, got {value}"),
        })
    }
}

impl<T: Transport> fmt::Display for CommandClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<CommandClient, {}>", self.peer)?;
        if self.simulated {
            f.write_str(" (simulated)")?;
        }
        Ok(())
    }
}

impl<T: Transport> fmt::Debug for CommandClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandClient")
            .field("peer", &self.peer)
            .field("simulated", &self.simulated)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}
