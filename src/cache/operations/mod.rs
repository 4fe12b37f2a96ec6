/// 缓存操作
/// 提供令牌读取、额度计数和存活检查

// 令牌记录读取
pub mod token;

// 月度额度计数
pub mod quota;

// 存活检查
pub mod health;

// 重新导出常用操作
pub use health::{HealthError, HealthProber};
pub use quota::{QuotaCounter, QuotaDecision, QuotaError, QuotaPolicy};
pub use token::{TokenError, TokenRepository};
