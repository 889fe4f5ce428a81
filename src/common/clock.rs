use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the unix time used for signature time checks.
///
/// 用于签名时间检查的 unix 时间来源。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Clock {
    /// The system clock.
    ///
    /// 系统时钟。
    #[default]
    System,
    /// A constant timestamp, for deterministic verification.
    ///
    /// 固定时间戳，用于确定性验证。
    Fixed(i64),
}

impl Clock {
    pub fn now(&self) -> i64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            Clock::Fixed(t) => *t,
        }
    }
}
