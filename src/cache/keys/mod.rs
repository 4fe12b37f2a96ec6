/// 缓存键模块
/// 提供各种缓存键生成函数

// 月度计数器键模块
pub mod counter_keys;

// 重新导出常用的键生成函数
pub use counter_keys::{counter_key, month_label};
