//! 跟踪指标
//!
//! 原子计数器，工作线程写入，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 跟踪链路的实时指标
///
/// ```rust
/// use captury_driver::TrackingMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = TrackingMetrics::default();
/// metrics.poll_cycles.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().poll_cycles, 1);
/// ```
#[derive(Debug, Default)]
pub struct TrackingMetrics {
    /// 执行过的轮询周期数（包括未连接的周期）
    pub poll_cycles: AtomicU64,
    pub connect_attempts: AtomicU64,
    pub connect_failures: AtomicU64,
    /// 丢弃的畸形记录数
    pub decode_errors: AtomicU64,
    pub transport_errors: AtomicU64,
    pub poses_published: AtomicU64,
    pub tag_snapshots: AtomicU64,
    pub actors_found: AtomicU64,
    pub actors_lost: AtomicU64,
    pub markers_updated: AtomicU64,
    pub constraints_sent: AtomicU64,
    /// 队列满或会话未连接而被丢弃的命令
    pub commands_dropped: AtomicU64,
}

impl TrackingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            poses_published: self.poses_published.load(Ordering::Relaxed),
            tag_snapshots: self.tag_snapshots.load(Ordering::Relaxed),
            actors_found: self.actors_found.load(Ordering::Relaxed),
            actors_lost: self.actors_lost.load(Ordering::Relaxed),
            markers_updated: self.markers_updated.load(Ordering::Relaxed),
            constraints_sent: self.constraints_sent.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.poll_cycles,
            &self.connect_attempts,
            &self.connect_failures,
            &self.decode_errors,
            &self.transport_errors,
            &self.poses_published,
            &self.tag_snapshots,
            &self.actors_found,
            &self.actors_lost,
            &self.markers_updated,
            &self.constraints_sent,
            &self.commands_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub poll_cycles: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
    pub poses_published: u64,
    pub tag_snapshots: u64,
    pub actors_found: u64,
    pub actors_lost: u64,
    pub markers_updated: u64,
    pub constraints_sent: u64,
    pub commands_dropped: u64,
}

impl MetricsSnapshot {
    /// 连接失败率（百分比），没有连接尝试时返回 0.0
    pub fn connect_failure_rate(&self) -> f64 {
        if self.connect_attempts == 0 {
            return 0.0;
        }
        (self.connect_failures as f64 / self.connect_attempts as f64) * 100.0
    }
}
