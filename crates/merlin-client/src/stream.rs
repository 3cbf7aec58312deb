//! 图像流读取
//!
//! 数据端口上的字节流依次为：一个前导信息块，然后是无限个图像帧，直到对端关闭。
//!
//! ```text
//! AwaitingPreamble --read_preamble--> Streaming --对端在帧边界关闭--> Ended(PeerClosed)
//!                                         \--截断/格式错误/IO 错误--> Ended(Failed)
//! ```
//!
//! 读取是惰性的：每次 `next` 只读取一帧，且在读取像素之前先校验声明长度。

use merlin_protocol::{
    AcquisitionPreamble, ImageFrame, ImageHeader, OUTER_PREFIX_LEN, ProtocolError,
    parse_outer_prefix, peek_header_len,
};
use std::io::{self, Read};
use std::iter::FusedIterator;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// 帧头探测长度（足以包含帧头长度字段）
const HEADER_PEEK_LEN: usize = 32;
/// 默认单帧最大字节数
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// 图像流错误
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

/// 流结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// 对端在帧边界关闭（正常结束）
    PeerClosed,
    /// 出错后终止
    Failed,
}

/// 读取器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    AwaitingPreamble,
    Streaming,
    Ended(StreamEnd),
}

/// 图像流读取器
///
/// 只能向前读取，结束后不能重新开始。
///
/// # Example
///
/// ```no_run
/// use merlin_client::StreamReader;
///
/// let mut reader = StreamReader::connect("127.0.0.1", 6342)?;
/// let preamble = reader.read_preamble()?;
/// println!("chip: {:?}", preamble.chip_id());
/// for frame in reader {
///     let frame = frame?;
///     println!("frame {} {:?}", frame.sequence(), frame.dimensions());
/// }
/// # Ok::<(), merlin_client::StreamError>(())
/// ```
pub struct StreamReader<R: Read = TcpStream> {
    reader: R,
    state: StreamState,
    preamble: Option<AcquisitionPreamble>,
    frames_read: u64,
    max_frame_len: usize,
}

impl StreamReader<TcpStream> {
    /// 连接数据端口（读操作无超时）
    pub fn connect(host: &str, port: u16) -> Result<Self, StreamError> {
        Self::connect_timeout(host, port, Duration::from_secs(5), None)
    }

    /// 连接数据端口
    ///
    /// `read_timeout` 为 `None` 时阻塞等待下一帧。
    pub fn connect_timeout(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self, StreamError> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(read_timeout)?;
                    info!("Stream connected to {}", addr);
                    return Ok(Self::new(stream));
                },
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address resolved for {host}"),
                )
            })
            .into())
    }
}

impl<R: Read> StreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: StreamState::AwaitingPreamble,
            preamble: None,
            frames_read: 0,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// 单帧最大字节数（超出时报 `FrameTooLarge`）
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn preamble(&self) -> Option<&AcquisitionPreamble> {
        self.preamble.as_ref()
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// 读取前导信息块（只读一次，之后返回缓存的结果）
    pub fn read_preamble(&mut self) -> Result<&AcquisitionPreamble, StreamError> {
        if self.state == StreamState::AwaitingPreamble {
            match self.read_preamble_inner() {
                Ok(preamble) => {
                    debug!("Preamble received ({} entries)", preamble.len());
                    self.preamble = Some(preamble);
                    self.state = StreamState::Streaming;
                },
                Err(e) => {
                    warn!("Failed to read preamble: {}", e);
                    self.state = StreamState::Ended(StreamEnd::Failed);
                    return Err(e);
                },
            }
        }
        self.preamble.as_ref().ok_or_else(|| {
            ProtocolError::InvalidPreamble("stream ended before a preamble was read".to_string())
                .into()
        })
    }

    fn read_preamble_inner(&mut self) -> Result<AcquisitionPreamble, StreamError> {
        let mut prefix = [0u8; OUTER_PREFIX_LEN];
        let n = read_full(&mut self.reader, &mut prefix)?;
        if n < OUTER_PREFIX_LEN {
            return Err(ProtocolError::InvalidPreamble(format!(
                "stream closed after {n} bytes of preamble prefix"
            ))
            .into());
        }
        let declared = self.checked_len(parse_outer_prefix(&prefix)?)?;

        let mut body = vec![0u8; declared];
        let n = read_full(&mut self.reader, &mut body)?;
        if n < declared {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: n,
            }
            .into());
        }
        Ok(AcquisitionPreamble::decode(&body)?)
    }

    /// 读取下一帧
    ///
    /// 返回 `Ok(None)` 表示对端在帧边界关闭，流正常结束。
    /// 尚未读取前导信息块时先读取它。
    pub fn next_frame(&mut self) -> Result<Option<ImageFrame>, StreamError> {
        match self.state {
            StreamState::Ended(_) => return Ok(None),
            StreamState::AwaitingPreamble => {
                self.read_preamble()?;
            },
            StreamState::Streaming => {},
        }

        match self.read_frame() {
            Ok(Some(frame)) => {
                self.frames_read += 1;
                trace!("Frame {} ({} bytes)", frame.sequence(), frame.payload().len());
                Ok(Some(frame))
            },
            Ok(None) => {
                info!("Stream closed by peer after {} frames", self.frames_read);
                self.state = StreamState::Ended(StreamEnd::PeerClosed);
                Ok(None)
            },
            Err(e) => {
                warn!("Stream failed after {} frames: {}", self.frames_read, e);
                self.state = StreamState::Ended(StreamEnd::Failed);
                Err(e)
            },
        }
    }

    fn read_frame(&mut self) -> Result<Option<ImageFrame>, StreamError> {
        let mut prefix = [0u8; OUTER_PREFIX_LEN];
        match read_full(&mut self.reader, &mut prefix)? {
            0 => return Ok(None),
            n if n < OUTER_PREFIX_LEN => {
                return Err(ProtocolError::InvalidPrefix(format!(
                    "stream closed inside frame prefix after {n} bytes"
                ))
                .into());
            },
            _ => {},
        }
        let declared = self.checked_len(parse_outer_prefix(&prefix)?)?;

        // 先读出帧头长度字段，再读完整帧头
        let peek_len = HEADER_PEEK_LEN.min(declared);
        let mut head = vec![0u8; peek_len];
        let n = read_full(&mut self.reader, &mut head)?;
        if n < peek_len {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: n,
            }
            .into());
        }
        let header_len = peek_header_len(&head)?.ok_or_else(|| {
            ProtocolError::InvalidHeader(format!(
                "header length field not found in {:?}",
                String::from_utf8_lossy(&head)
            ))
        })?;
        if header_len < peek_len || header_len > declared {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: header_len,
            }
            .into());
        }

        head.resize(header_len, 0);
        let n = read_full(&mut self.reader, &mut head[peek_len..])?;
        if n < header_len - peek_len {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: peek_len + n,
            }
            .into());
        }
        let header = ImageHeader::decode(&head)?;

        // 声明长度必须与帧头描述的像素字节数一致
        if header.header_len != header_len || header.frame_len() != declared {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: header.frame_len(),
            }
            .into());
        }

        let mut payload = vec![0u8; header.pixel_len()];
        let n = read_full(&mut self.reader, &mut payload)?;
        if n < payload.len() {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: header_len + n,
            }
            .into());
        }

        Ok(Some(ImageFrame::new(header, payload)?))
    }

    fn checked_len(&self, len: usize) -> Result<usize, ProtocolError> {
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len,
                limit: self.max_frame_len,
            });
        }
        Ok(len)
    }
}

impl<R: Read> Iterator for StreamReader<R> {
    type Item = Result<ImageFrame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

impl<R: Read> FusedIterator for StreamReader<R> {}

/// 尽量读满 `buf`，返回实际读到的字节数（小于 `buf.len()` 表示遇到 EOF）
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use merlin_protocol::{PixelEncoding, encode_image_frame};
    use std::io::Cursor;

    fn preamble() -> AcquisitionPreamble {
        AcquisitionPreamble::from_entries([("Chip ID", "W509_L5"), ("Counter Depth (number)", "12")])
    }

    fn stream_of(frames: &[(ImageHeader, Vec<u8>)]) -> Vec<u8> {
        let mut out = preamble().to_frame().unwrap();
        for (header, pixels) in frames {
            out.extend(encode_image_frame(header, pixels).unwrap());
        }
        out
    }

    /// 每次最多返回 `step` 字节的读取器
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_preamble_then_frames() {
        let frames: Vec<_> = (1..=3)
            .map(|seq| {
                let header = ImageHeader::new(seq, 4, 3, PixelEncoding::U16);
                let pixels = vec![seq as u8; header.pixel_len()];
                (header, pixels)
            })
            .collect();
        let mut reader = StreamReader::new(Cursor::new(stream_of(&frames)));

        assert_eq!(reader.read_preamble().unwrap().chip_id(), Some("W509_L5"));
        let got: Vec<_> = reader.by_ref().map(|f| f.unwrap()).collect();
        assert_eq!(got.len(), 3);
        for (i, frame) in got.iter().enumerate() {
            assert_eq!(frame.sequence(), i as u32 + 1);
            assert_eq!(frame.payload().len(), 4 * 3 * 2);
        }
        assert_eq!(reader.state(), StreamState::Ended(StreamEnd::PeerClosed));
        assert_eq!(reader.frames_read(), 3);
    }

    #[test]
    fn test_preamble_read_implicitly() {
        let header = ImageHeader::new(1, 1, 1, PixelEncoding::U8);
        let mut reader = StreamReader::new(Cursor::new(stream_of(&[(header, vec![9])])));
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload()[..], [9]);
        assert_eq!(reader.preamble().unwrap().counter_depth(), Some(12));
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_trickled_reads() {
        let header = ImageHeader::new(5, 8, 8, PixelEncoding::U32);
        let pixels: Vec<u8> = (0..header.pixel_len()).map(|i| i as u8).collect();
        let data = stream_of(&[(header.clone(), pixels.clone())]);
        let reader = StreamReader::new(Trickle {
            data: Cursor::new(data),
            step: 7,
        });
        let frames: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header(), &header);
        assert_eq!(frames[0].payload()[..], pixels[..]);
    }

    #[test]
    fn test_declared_length_mismatch() {
        let header = ImageHeader::new(1, 2, 2, PixelEncoding::U8);
        let mut data = preamble().to_frame().unwrap();
        // 声明长度比帧头描述的多 4 字节
        data.extend(b"MPX,0000000392,");
        data.extend(header.encode().unwrap());
        data.extend([0u8; 8]);

        let mut reader = StreamReader::new(Cursor::new(data));
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(
            err,
            StreamError::Protocol(ProtocolError::FrameLengthMismatch {
                declared: 392,
                actual: 388
            })
        ));
        assert_eq!(reader.state(), StreamState::Ended(StreamEnd::Failed));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_payload() {
        let header = ImageHeader::new(1, 16, 16, PixelEncoding::U8);
        let mut data = stream_of(&[(header, vec![0u8; 256])]);
        data.truncate(data.len() - 10);

        let mut reader = StreamReader::new(Cursor::new(data));
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(
            err,
            StreamError::Protocol(ProtocolError::FrameLengthMismatch {
                declared: 640,
                actual: 630
            })
        ));
    }

    #[test]
    fn test_truncated_prefix() {
        let mut data = preamble().to_frame().unwrap();
        data.extend(b"MPX,00000");
        let mut reader = StreamReader::new(Cursor::new(data));
        assert!(matches!(
            reader.next_frame(),
            Err(StreamError::Protocol(ProtocolError::InvalidPrefix(_)))
        ));
    }

    #[test]
    fn test_garbled_prefix() {
        let mut data = preamble().to_frame().unwrap();
        data.extend(b"XYZ,0000000392,");
        let mut reader = StreamReader::new(Cursor::new(data));
        assert!(matches!(
            reader.next_frame(),
            Err(StreamError::Protocol(ProtocolError::InvalidPrefix(_)))
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let header = ImageHeader::new(1, 64, 64, PixelEncoding::U32);
        let data = stream_of(&[(header.clone(), vec![0u8; header.pixel_len()])]);
        let mut reader = StreamReader::new(Cursor::new(data)).with_max_frame_len(1024);
        assert!(matches!(
            reader.next_frame(),
            Err(StreamError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[test]
    fn test_missing_preamble() {
        let mut reader = StreamReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_preamble().is_err());
        assert_eq!(reader.state(), StreamState::Ended(StreamEnd::Failed));
        assert!(reader.next_frame().unwrap().is_none());
    }
}
