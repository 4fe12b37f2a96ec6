// 缓存模块
// 包含键值存储抽象、后端实现、键生成和数据模型

pub mod backends;
pub mod keys;
pub mod models;
pub mod operations;
pub mod store;

// 重新导出常用类型，方便其他模块使用
pub use backends::{EtcdStore, MemoryStore, RedisStore};
pub use models::TokenRecord;
pub use operations::{HealthProber, QuotaCounter, TokenRepository};
pub use store::{Deadline, Expiry, KeyValueStore, StoreError};
