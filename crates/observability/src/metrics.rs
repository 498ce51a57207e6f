//! 时序指标收集模块
//!
//! 基于 TrackingFrame 收集和统计场景时间的运行指标。

use std::fmt;

use contracts::{FrameRate, QualifiedFrameTime, TrackingFrame};
use metrics::{counter, gauge, histogram};

/// 从 TrackingFrame 记录指标
///
/// 每发布一帧调用一次。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_tracking_frame;
///
/// let output = session.process(&packet);
/// record_tracking_frame(&output.frame);
/// ```
pub fn record_tracking_frame(frame: &TrackingFrame) {
    let timing = if frame.timing_valid {
        "valid"
    } else {
        "fallback"
    };
    counter!("stype_frames_total", "timing" => timing).increment(1);

    gauge!("stype_scene_frame_number").set(frame.scene_time.frame_number as f64);
    gauge!("stype_scene_frame_rate").set(frame.scene_time.frame_rate.as_decimal());
    gauge!("stype_last_package_no").set(f64::from(frame.package_no));

    if frame.received_at > 0.0 {
        // 场景时间与接收时间的差值
        histogram!("stype_scene_time_offset_s")
            .record(frame.received_at - frame.scene_time.as_seconds());
    }
}

/// 记录帧分发结果
pub fn record_frame_dispatched(sink_name: &str, success: bool) {
    record_frames_dispatched(sink_name, success, 1);
}

/// 批量记录帧分发结果 (count 为 0 时不记录)
pub fn record_frames_dispatched(sink_name: &str, success: bool, count: u64) {
    if count == 0 {
        return;
    }
    let status = if success { "success" } else { "failure" };
    counter!(
        "stype_frames_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(count);
}

/// 记录 sink 队列深度
pub fn record_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "stype_sink_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// 时序指标聚合器
///
/// 在内存中聚合场景时间的连续性，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct TimingMetricsAggregator {
    /// 总帧数
    pub total_frames: u64,

    /// 使用估计时间的帧数
    pub valid_frames: u64,

    /// 使用回退速率的帧数
    pub fallback_frames: u64,

    /// 估计有效/无效切换次数
    pub validity_changes: u64,

    /// 帧率变化次数
    pub rate_changes: u64,

    /// 场景时间倒退次数
    pub backward_steps: u64,

    /// 相邻帧场景时间步长 (同一帧率下, 帧)
    pub step_stats: StepStats,

    last_time: Option<QualifiedFrameTime>,
    last_valid: Option<bool>,
}

impl TimingMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, frame: &TrackingFrame) {
        self.total_frames += 1;
        if frame.timing_valid {
            self.valid_frames += 1;
        } else {
            self.fallback_frames += 1;
        }

        if self
            .last_valid
            .is_some_and(|valid| valid != frame.timing_valid)
        {
            self.validity_changes += 1;
        }
        self.last_valid = Some(frame.timing_valid);

        let current = frame.scene_time;
        if let Some(last) = self.last_time {
            if last.frame_rate != current.frame_rate {
                self.rate_changes += 1;
            } else if current.frame_number < last.frame_number {
                self.backward_steps += 1;
            } else {
                self.step_stats
                    .push(current.frame_number - last.frame_number);
            }
        }
        self.last_time = Some(current);
    }

    /// 最近一帧的帧率
    pub fn current_rate(&self) -> Option<FrameRate> {
        self.last_time.map(|time| time.frame_rate)
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames,
            valid_frames: self.valid_frames,
            fallback_frames: self.fallback_frames,
            valid_ratio: if self.total_frames > 0 {
                self.valid_frames as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            },
            validity_changes: self.validity_changes,
            rate_changes: self.rate_changes,
            backward_steps: self.backward_steps,
            scene_steps: self.step_stats,
            final_time: self.last_time,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub valid_frames: u64,
    pub fallback_frames: u64,
    /// 百分比
    pub valid_ratio: f64,
    pub validity_changes: u64,
    pub rate_changes: u64,
    pub backward_steps: u64,
    pub scene_steps: StepStats,
    pub final_time: Option<QualifiedFrameTime>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Timing Metrics Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(
            f,
            "Estimated frames: {} ({:.2}%)",
            self.valid_frames, self.valid_ratio
        )?;
        writeln!(f, "Fallback frames: {}", self.fallback_frames)?;
        writeln!(f, "Validity changes: {}", self.validity_changes)?;
        writeln!(f, "Frame rate changes: {}", self.rate_changes)?;
        writeln!(f, "Backward steps: {}", self.backward_steps)?;
        writeln!(f, "Scene step (frames): {}", self.scene_steps)?;
        if let Some(time) = self.final_time {
            writeln!(f, "Final scene time: {time} ({:.3}s)", time.as_seconds())?;
        }
        Ok(())
    }
}

/// 场景时间步长统计 (帧)
///
/// 步长 1 为正常连续; 0 为重复帧 (回退速率下同一时间码);
/// 大于 1 表示中间有帧丢失。均值与方差用 Welford 在线算法。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    count: u64,
    min: u64,
    max: u64,
    mean: f64,
    m2: f64,
    repeats: u64,
    gaps: u64,
}

impl StepStats {
    pub fn push(&mut self, step: u64) {
        self.count += 1;
        match step {
            0 => self.repeats += 1,
            1 => {}
            _ => self.gaps += 1,
        }

        if self.count == 1 {
            self.min = step;
            self.max = step;
        } else {
            self.min = self.min.min(step);
            self.max = self.max.max(step);
        }

        let value = step as f64;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 样本标准差
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    /// 步长为 0 的次数
    pub fn repeats(&self) -> u64 {
        self.repeats
    }

    /// 步长大于 1 的次数
    pub fn gaps(&self) -> u64 {
        self.gaps
    }
}

impl fmt::Display for StepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={}, max={}, mean={:.3}, std={:.3}, repeats={}, gaps={} (n={})",
            self.min,
            self.max,
            self.mean,
            self.std_dev(),
            self.repeats,
            self.gaps,
            self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_number: u64, fps: u32, timing_valid: bool) -> TrackingFrame {
        TrackingFrame {
            scene_time: QualifiedFrameTime::new(frame_number, FrameRate::from_fps(fps)),
            timing_valid,
            ..Default::default()
        }
    }

    #[test]
    fn test_step_stats() {
        let mut stats = StepStats::default();
        for step in [1, 1, 0, 3, 1] {
            stats.push(step);
        }

        assert_eq!(stats.count(), 5);
        assert_eq!(stats.min(), 0);
        assert_eq!(stats.max(), 3);
        assert!((stats.mean() - 1.2).abs() < 1e-10);
        assert!((stats.std_dev() - 1.2f64.sqrt()).abs() < 1e-10);
        assert_eq!(stats.repeats(), 1);
        assert_eq!(stats.gaps(), 1);
        assert_eq!(
            stats.to_string(),
            "min=0, max=3, mean=1.200, std=1.095, repeats=1, gaps=1 (n=5)"
        );
    }

    #[test]
    fn test_aggregator_fallback_then_valid() {
        let mut aggregator = TimingMetricsAggregator::new();

        // 回退速率 60fps 下的原始时间码
        aggregator.update(&frame(120, 60, false));
        aggregator.update(&frame(120, 60, false));
        // 确认 50fps 后切换到估计时间
        aggregator.update(&frame(100, 50, true));
        aggregator.update(&frame(101, 50, true));
        aggregator.update(&frame(103, 50, true));

        assert_eq!(aggregator.total_frames, 5);
        assert_eq!(aggregator.valid_frames, 3);
        assert_eq!(aggregator.fallback_frames, 2);
        assert_eq!(aggregator.validity_changes, 1);
        assert_eq!(aggregator.rate_changes, 1);
        assert_eq!(aggregator.backward_steps, 0);
        assert_eq!(aggregator.step_stats.count(), 3);
        assert_eq!(aggregator.step_stats.max(), 2);
        assert_eq!(aggregator.step_stats.gaps(), 1);
        assert_eq!(aggregator.current_rate(), Some(FrameRate::from_fps(50)));
    }

    #[test]
    fn test_aggregator_backward_step() {
        let mut aggregator = TimingMetricsAggregator::new();
        aggregator.update(&frame(500, 25, true));
        aggregator.update(&frame(499, 25, true));

        assert_eq!(aggregator.backward_steps, 1);
        assert_eq!(aggregator.step_stats.count(), 0);

        aggregator.reset();
        assert_eq!(aggregator.total_frames, 0);
        assert_eq!(aggregator.current_rate(), None);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = TimingMetricsAggregator::new();
        for n in 0..4 {
            aggregator.update(&frame(n, 25, n > 0));
        }

        let summary = aggregator.summary();
        assert!((summary.valid_ratio - 75.0).abs() < 1e-10);

        let output = summary.to_string();
        assert!(output.contains("Total frames: 4"));
        assert!(output.contains("75.00%"));
        assert!(output.contains("Final scene time: 3@25fps"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = TimingMetricsAggregator::new().summary();
        assert_eq!(summary.valid_ratio, 0.0);
        assert!(summary.to_string().contains("Scene step (frames): N/A"));
    }

    #[test]
    fn test_record_functions_without_recorder() {
        // 未安装 recorder 时为空操作
        record_tracking_frame(&frame(1, 60, true));
        record_frame_dispatched("log", true);
        record_frames_dispatched("log", false, 0);
        record_queue_depth("log", 3);
    }
}
