/// 存储后端实现
mod etcd_store;
mod memory_store;
mod redis_store;

pub use etcd_store::EtcdStore;
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
