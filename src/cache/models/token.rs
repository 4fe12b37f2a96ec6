use serde::{Deserialize, Serialize};

/// 令牌存储记录
///
/// 由注册服务写入，网关只读。字段名沿用已有存储中的 PascalCase 格式。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    #[serde(rename = "UserEmail")]
    pub user_email: String,
    /// 部分后端版本的记录不带额度字段
    #[serde(rename = "MonthlyLimit", default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<i64>,
    #[serde(rename = "Revoked", default)]
    pub revoked: bool,
}

impl TokenRecord {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
