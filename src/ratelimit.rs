use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// 固定时间窗口的查询速率限制器
///
/// 每个窗口内最多放行 `max_per_window` 次查询，窗口结束后计数清零。
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u64,
    window: Duration,
    state: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u64,
}

impl RateLimiter {
    /// 每秒最多 `max_per_sec` 次
    pub fn per_second(max_per_sec: u64) -> Self {
        Self::new(max_per_sec, Duration::from_secs(1))
    }

    pub fn new(max_per_window: u64, window: Duration) -> Self {
        RateLimiter {
            max_per_window: max_per_window.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// 每个窗口的配额
    pub fn quota(&self) -> u64 {
        self.max_per_window
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        // 计数器在 panic 后仍然可用
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn roll(&self, w: &mut Window) {
        if w.started.elapsed() >= self.window {
            w.started = Instant::now();
            w.used = 0;
        }
    }

    /// 当前窗口剩余配额
    pub fn remaining(&self) -> u64 {
        let mut w = self.lock();
        self.roll(&mut w);
        self.max_per_window.saturating_sub(w.used)
    }

    /// 尝试占用一次配额，失败时返回距离窗口重置的时间
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut w = self.lock();
        self.roll(&mut w);
        if w.used < self.max_per_window {
            w.used += 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(w.started.elapsed()))
        }
    }

    /// 等待直到获得一次配额
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => sleep(wait.max(Duration::from_millis(1))).await,
            }
        }
    }
}
