use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use domain::{Identity, Timestamp};

/// 限流参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// 一个窗口内允许的最大消息数
    pub max_messages_per_window: u32,
    /// 滑动窗口宽度
    pub window_duration: Duration,
    /// 超限后的封禁时长
    pub block_duration: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_messages_per_window: 10,
            window_duration: Duration::from_secs(10),
            block_duration: Duration::from_secs(5),
        }
    }
}

/// 被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// 仍处于封禁期
    StillBlocked,
    /// 本次检查触发了封禁
    TooManyMessages,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::StillBlocked => f.write_str("rate-limited, retry later"),
            BlockReason::TooManyMessages => f.write_str("too many messages"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Blocked(BlockReason),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

/// 单个身份的限流状态
#[derive(Debug, Default)]
struct RateState {
    recent_sends: VecDeque<Timestamp>,
    blocked_until: Option<Timestamp>,
}

/// 按身份的滑动窗口限流器
///
/// 每次检查都会按 `now - window_duration` 过滤历史时间戳，而不是固定分桶。
/// 窗口内的记录数不会超过 `max_messages_per_window`，所以过滤的开销是有界的。
/// 状态只属于 `ConnectionHub`，不做内部加锁。
#[derive(Debug, Default)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    states: HashMap<Identity, RateState>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            states: HashMap::new(),
        }
    }

    /// 检查并记录一次发送
    pub fn check_and_record(&mut self, identity: &Identity, now: Timestamp) -> RateDecision {
        let policy = self.policy;
        let state = self.states.entry(identity.clone()).or_default();

        // 封禁期内的尝试既不记录也不延长封禁
        if let Some(until) = state.blocked_until {
            if now < until {
                return RateDecision::Blocked(BlockReason::StillBlocked);
            }
            state.blocked_until = None;
        }

        let cutoff = now - policy.window_duration;
        state.recent_sends.retain(|sent| *sent >= cutoff);

        if state.recent_sends.len() >= policy.max_messages_per_window as usize {
            state.blocked_until = Some(now + policy.block_duration);
            // 封禁结束后从空窗口重新计数
            state.recent_sends.clear();
            tracing::warn!(
                identity = %identity,
                block_seconds = policy.block_duration.as_secs(),
                "identity rate limited"
            );
            return RateDecision::Blocked(BlockReason::TooManyMessages);
        }

        state.recent_sends.push_back(now);
        RateDecision::Allow
    }

    /// 断开连接时丢弃状态，重新上线的身份从零开始
    pub fn forget(&mut self, identity: &Identity) {
        self.states.remove(identity);
    }

    pub fn recorded_sends(&self, identity: &Identity) -> usize {
        self.states
            .get(identity)
            .map(|state| state.recent_sends.len())
            .unwrap_or(0)
    }

    pub fn blocked_until(&self, identity: &Identity) -> Option<Timestamp> {
        self.states.get(identity).and_then(|state| state.blocked_until)
    }

    pub fn tracked_identities(&self) -> usize {
        self.states.len()
    }
}
