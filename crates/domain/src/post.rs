use serde::{Deserialize, Serialize};

use crate::value_objects::{PostId, Timestamp, UserId};

/// 持久化存储中的动态（status update）记录。
///
/// 时间线只保存 `id`，读取时再按 ID 回查这条记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}
