//! Feed 引擎核心领域模型
//!
//! 包含用户、帖子、时间线键、地理坐标等值对象，以及引擎依赖的外部协作方接口。

pub mod errors;
pub mod post;
pub mod repository;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use post::Post;
pub use repository::{PostRepository, SocialGraph};
pub use value_objects::*;

#[cfg(any(test, feature = "testing"))]
pub use repository::{MockPostRepository, MockSocialGraph};
