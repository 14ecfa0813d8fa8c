//! 固定窗口限流 - (subject, action) 维度的请求配额
//!
//! 计数语义：先加一再与上限比较；窗口过期时间只在本窗口第一次
//! 计数时设置，后续计数不会刷新过期时间（否则持续请求会让窗口
//! 永不关闭）。过期后的下一次请求重建一个新窗口。
//!
//! 这是固定窗口而非滑动窗口：紧贴窗口边界的突发最多可以在短时
//! 间内通过 `2 * limit` 次请求。这是该方案的已知特性，按特性
//! 对待并在测试里固定下来。

use dashmap::DashMap;
use shared::types::Timestamp;
use shared::util::now_millis;

/// One counting window for a (subject, action) pair.
#[derive(Debug, Clone)]
struct RateWindow {
    count: u32,
    expires_at: Timestamp,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted; `remaining` quota left in this window.
    Allowed { remaining: u32 },
    /// Quota exhausted; the window closes in `retry_after_ms`.
    Denied { retry_after_ms: i64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Fixed-window request counter.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<(String, String), RateWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one `action` by `subject` against `limit` per `window_secs`.
    pub fn admit(&self, subject: &str, action: &str, limit: u32, window_secs: u64) -> Admission {
        self.admit_at(subject, action, limit, window_secs, now_millis())
    }

    /// [`admit`](Self::admit) against an explicit clock reading. The window
    /// rule is evaluated at call time only; nothing runs in the background
    /// on expiry.
    pub fn admit_at(
        &self,
        subject: &str,
        action: &str,
        limit: u32,
        window_secs: u64,
        now: Timestamp,
    ) -> Admission {
        let window_ms = (window_secs * 1000) as i64;
        let mut entry = self
            .windows
            .entry((subject.to_string(), action.to_string()))
            .or_insert_with(|| RateWindow {
                count: 0,
                expires_at: now + window_ms,
            });

        // A dead window is replaced wholesale; only then does the expiry
        // move forward.
        if entry.expires_at <= now {
            *entry = RateWindow {
                count: 0,
                expires_at: now + window_ms,
            };
        }

        entry.count += 1;
        if entry.count > limit {
            let retry_after_ms = (entry.expires_at - now).max(0);
            tracing::debug!(subject, action, count = entry.count, limit, "Rate limited");
            Admission::Denied { retry_after_ms }
        } else {
            Admission::Allowed {
                remaining: limit - entry.count,
            }
        }
    }

    /// Drop windows that expired before `now`. Returns how many were
    /// removed. Run periodically so idle subjects do not accumulate.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.expires_at > now);
        before - self.windows.len()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}
