//! 固定步长计时器
//!
//! 场景更新以固定的 60 Hz 步进，渲染频率不受影响。
//! 单帧间隔超过 `MAX_DELTA` 时截断，避免调试断点之后一次追赶几百步。

use std::time::{Duration, Instant};

/// 每秒的固定更新次数
pub const TICKS_PER_SECOND: u32 = 60;

const MAX_DELTA: Duration = Duration::from_millis(100);

/// 固定步长计时器
#[derive(Debug)]
pub struct StepTimer {
    last: Option<Instant>,
    target_elapsed: Duration,
    accumulator: Duration,
    total: Duration,
    tick_count: u64,

    // FPS 统计
    frames_this_second: u32,
    second_counter: Duration,
    frames_per_second: u32,
}

impl StepTimer {
    pub fn new() -> Self {
        Self {
            last: None,
            target_elapsed: Duration::from_secs(1) / TICKS_PER_SECOND,
            accumulator: Duration::ZERO,
            total: Duration::ZERO,
            tick_count: 0,
            frames_this_second: 0,
            second_counter: Duration::ZERO,
            frames_per_second: 0,
        }
    }

    /// 按真实时间推进，返回本次执行的固定步数
    pub fn tick<F: FnMut(&StepTimer)>(&mut self, update: F) -> u32 {
        let now = Instant::now();
        let delta = self.last.map_or(Duration::ZERO, |last| now - last);
        self.last = Some(now);
        self.advance(delta, update)
    }

    /// 按给定的时间间隔推进
    ///
    /// # 返回值
    ///
    /// 本次调用中 `update` 被执行的次数
    pub fn advance<F: FnMut(&StepTimer)>(&mut self, delta: Duration, mut update: F) -> u32 {
        let delta = delta.min(MAX_DELTA);

        self.accumulator += delta;
        let mut steps = 0;
        while self.accumulator >= self.target_elapsed {
            self.accumulator -= self.target_elapsed;
            self.total += self.target_elapsed;
            self.tick_count += 1;
            steps += 1;
            update(self);
        }

        self.frames_this_second += 1;
        self.second_counter += delta;
        if self.second_counter >= Duration::from_secs(1) {
            self.frames_per_second = self.frames_this_second;
            self.frames_this_second = 0;
            self.second_counter -= Duration::from_secs(1);
        }

        steps
    }

    /// 固定步长（秒）
    pub fn elapsed_seconds(&self) -> f32 {
        self.target_elapsed.as_secs_f32()
    }

    /// 累计的模拟时间（秒）
    pub fn total_seconds(&self) -> f32 {
        self.total.as_secs_f32()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// 上一整秒内 `advance` 的调用次数
    pub fn frames_per_second(&self) -> u32 {
        self.frames_per_second
    }
}

impl Default for StepTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_steps() {
        let mut timer = StepTimer::new();
        let mut calls = 0;

        let steps = timer.advance(Duration::from_millis(50), |_| calls += 1);
        assert_eq!(steps, 3);
        assert_eq!(calls, 3);
        assert_eq!(timer.tick_count(), 3);
        assert!((timer.total_seconds() - 3.0 / 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_large_delta_is_clamped() {
        let mut timer = StepTimer::new();
        let steps = timer.advance(Duration::from_secs(5), |_| {});
        assert_eq!(steps, 6);
    }

    #[test]
    fn test_frames_per_second() {
        let mut timer = StepTimer::new();
        for _ in 0..10 {
            timer.advance(Duration::from_millis(100), |_| {});
        }
        assert_eq!(timer.frames_per_second(), 10);
    }
}
