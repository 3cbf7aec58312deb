//! Mock 端点（仅 `mock` feature）
//!
//! - [`MockEndpoint`]: 命令端口替身，收到完整请求后回显请求并追加状态后缀
//! - [`MockAcquisitionServer`]: 数据端口替身，接受一个连接，发送前导信息块和若干图像帧后关闭
//!
//! 两者都监听 `127.0.0.1:0`，由系统分配端口。

use merlin_protocol::{
    AcquisitionPreamble, FrameProgress, ImageHeader, ProtocolError, encode_image_frame,
    response_progress,
};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const ACCEPT_DEADLINE: Duration = Duration::from_secs(10);

type Responder = dyn Fn(&[u8]) -> Vec<u8> + Send + Sync;

/// 命令端口替身
///
/// 每个连接一个线程；`drop` 时停止接受连接并通知各连接线程退出。
pub struct MockEndpoint {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    accept_thread: Option<JoinHandle<()>>,
}

impl MockEndpoint {
    /// 回显请求并追加 `suffix`（如 `",0"`、`",3"`）
    pub fn echo(suffix: impl Into<Vec<u8>>) -> io::Result<Self> {
        let suffix = suffix.into();
        Self::with_responder(move |request| {
            let mut reply = request.to_vec();
            reply.extend_from_slice(&suffix);
            reply
        })
    }

    /// 回显并返回成功状态
    pub fn echo_success() -> io::Result<Self> {
        Self::echo(",0")
    }

    /// 收到请求但从不回复（用于读超时测试）
    pub fn silent() -> io::Result<Self> {
        Self::with_responder(|_| Vec::new())
    }

    /// 自定义回复；返回空字节表示不回复
    pub fn with_responder<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let received = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let accept_thread = {
            let stop = stop.clone();
            let received = received.clone();
            thread::Builder::new()
                .name("mock-endpoint".to_string())
                .spawn(move || accept_loop(listener, stop, received, responder))?
        };

        debug!("Mock endpoint listening on {}", addr);
        Ok(Self {
            addr,
            stop,
            received,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// 目前收到的全部请求（按到达顺序）
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().clone()
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    responder: Arc<Responder>,
) {
    let mut handlers = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("Mock endpoint accepted {}", peer);
                let stop = stop.clone();
                let received = received.clone();
                let responder = responder.clone();
                handlers.push(thread::spawn(move || {
                    if let Err(e) = serve_connection(stream, &stop, &received, &*responder) {
                        trace!("Mock connection ended: {}", e);
                    }
                }));
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(_) => break,
        }
    }
    for handle in handlers {
        let _ = handle.join();
    }
}

fn serve_connection(
    mut stream: TcpStream,
    stop: &AtomicBool,
    received: &Mutex<Vec<Vec<u8>>>,
    responder: &Responder,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL * 5))?;

    let mut chunk = [0u8; 4096];
    let mut pending = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        let n = match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            },
            Err(e) => return Err(e),
        };
        pending.extend_from_slice(&chunk[..n]);

        if matches!(
            response_progress(&pending),
            FrameProgress::Complete | FrameProgress::Unframed
        ) {
            let request = std::mem::take(&mut pending);
            let reply = responder(&request);
            received.lock().push(request);
            if !reply.is_empty() {
                stream.write_all(&reply)?;
            }
        }
    }
    Ok(())
}

/// 编码一次完整采集的数据流：前导信息块 + 各图像帧
pub fn acquisition_stream(
    preamble: &AcquisitionPreamble,
    frames: &[(ImageHeader, Vec<u8>)],
) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let mut chunks = Vec::with_capacity(frames.len() + 1);
    chunks.push(preamble.to_frame()?);
    for (header, pixels) in frames {
        chunks.push(encode_image_frame(header, pixels)?);
    }
    Ok(chunks)
}

/// 数据端口替身
///
/// 接受一个连接，按顺序写出给定的字节块，然后关闭连接。
pub struct MockAcquisitionServer {
    addr: SocketAddr,
    handle: Option<JoinHandle<io::Result<()>>>,
}

impl MockAcquisitionServer {
    pub fn serve(chunks: Vec<Vec<u8>>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let handle = thread::Builder::new()
            .name("mock-acquisition".to_string())
            .spawn(move || {
                let mut stream = accept_with_deadline(&listener)?;
                stream.set_nonblocking(false)?;
                for chunk in &chunks {
                    stream.write_all(chunk)?;
                }
                stream.flush()?;
                debug!("Mock acquisition server sent {} chunks", chunks.len());
                Ok(())
            })?;

        Ok(Self {
            addr,
            handle: Some(handle),
        })
    }

    /// 发送前导信息块和给定图像帧
    pub fn with_frames(
        preamble: &AcquisitionPreamble,
        frames: &[(ImageHeader, Vec<u8>)],
    ) -> io::Result<Self> {
        let chunks = acquisition_stream(preamble, frames)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Self::serve(chunks)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// 等待发送线程结束
    pub fn join(mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("mock acquisition thread panicked"))?,
            None => Ok(()),
        }
    }
}

fn accept_with_deadline(listener: &TcpListener) -> io::Result<TcpStream> {
    let deadline = Instant::now() + ACCEPT_DEADLINE;
    loop {
        match listener.accept() {
            Ok((stream, _)) => return Ok(stream),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no client connected"));
                }
                thread::sleep(POLL_INTERVAL);
            },
            Err(e) => return Err(e),
        }
    }
}
