//! User Profile Model

use serde::{Deserialize, Serialize};

/// Resolved user identity as returned by the user directory collaborator.
///
/// 认证由外部协作方负责，本服务只消费解析结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
}
