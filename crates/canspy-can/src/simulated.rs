//! 模拟流量后端
//!
//! 在没有 CAN 硬件时产生周期性流量：若干标准帧 / 扩展帧周期报文，
//! FD 模式下额外产生一条 64 字节的 FD 报文。周期带少量随机抖动。

use crate::{BusBackend, BusConfig, CanAdapter, CanError, ChannelInfo, RawFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// 单条周期报文
#[derive(Debug, Clone)]
struct SimStream {
    id: u32,
    is_extended: bool,
    is_fd: bool,
    period: Duration,
    len: usize,
    next_due: Instant,
    counter: u8,
}

impl SimStream {
    fn new(id: u32, is_extended: bool, is_fd: bool, period_ms: u64, len: usize) -> Self {
        Self {
            id,
            is_extended,
            is_fd,
            period: Duration::from_millis(period_ms),
            len,
            next_due: Instant::now(),
            counter: 0,
        }
    }

    fn build_frame(&mut self, rng: &mut StdRng) -> RawFrame {
        let mut payload = [0u8; 64];
        payload[0] = self.counter;
        rng.fill(&mut payload[1..self.len.max(1)]);
        self.counter = self.counter.wrapping_add(1);

        let data = &payload[..self.len];
        if self.is_fd {
            RawFrame::new_fd(self.id, data, self.is_extended)
        } else if self.is_extended {
            RawFrame::new_extended(self.id, data)
        } else {
            RawFrame::new_standard(self.id as u16, data)
        }
    }
}

/// 模拟适配器
pub struct SimulatedAdapter {
    streams: Vec<SimStream>,
    timeout: Duration,
    jitter: f64,
    rng: StdRng,
    open: bool,
}

impl SimulatedAdapter {
    /// 创建模拟适配器
    ///
    /// # 参数
    /// - `fd`: 是否额外产生 FD 报文
    pub fn new(fd: bool) -> Self {
        let mut streams = vec![
            SimStream::new(0x100, false, false, 10, 8),
            SimStream::new(0x1A0, false, false, 20, 4),
            SimStream::new(0x7FF, false, false, 100, 2),
            SimStream::new(0x18DA_F110, true, false, 50, 8),
        ];
        if fd {
            streams.push(SimStream::new(0x300, false, true, 25, 64));
        }

        Self {
            streams,
            timeout: Duration::from_secs(1),
            jitter: 0.02,
            rng: StdRng::from_entropy(),
            open: true,
        }
    }

    fn wall_clock_seconds() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl CanAdapter for SimulatedAdapter {
    fn receive(&mut self) -> Result<RawFrame, CanError> {
        if !self.open {
            return Err(CanError::NotStarted);
        }

        let Some(index) = self
            .streams
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.next_due)
            .map(|(i, _)| i)
        else {
            thread::sleep(self.timeout);
            return Err(CanError::Timeout);
        };

        let wait = self.streams[index]
            .next_due
            .saturating_duration_since(Instant::now());
        if wait > self.timeout {
            thread::sleep(self.timeout);
            return Err(CanError::Timeout);
        }
        thread::sleep(wait);

        let factor = 1.0 + self.rng.gen_range(-self.jitter..=self.jitter);
        let stream = &mut self.streams[index];
        stream.next_due += stream.period.mul_f64(factor);
        let frame = stream
            .build_frame(&mut self.rng)
            .with_timestamp(Self::wall_clock_seconds());

        Ok(frame)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn shutdown(&mut self) -> Result<(), CanError> {
        self.open = false;
        Ok(())
    }
}

/// 模拟后端：提供 `sim0` 一个通道
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend;

impl SimulatedBackend {
    /// 模拟通道名称
    pub const CHANNEL: &'static str = "sim0";
}

impl BusBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn open(&self, config: &BusConfig) -> Result<Box<dyn CanAdapter + Send>, CanError> {
        trace!(
            "Simulated bus '{}' opened (bitrate {} ignored)",
            config.channel, config.bitrate
        );
        Ok(Box::new(SimulatedAdapter::new(config.fd)))
    }

    fn candidates(&self) -> Vec<String> {
        vec![Self::CHANNEL.to_string()]
    }

    fn probe(&self, channel: &str) -> Result<ChannelInfo, CanError> {
        Ok(ChannelInfo {
            channel: channel.to_string(),
            display_name: format!("Simulated bus {}", channel),
            fd_capable: true,
        })
    }
}
