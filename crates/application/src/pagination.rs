//! 基于游标的分页（feed 与其他按时间倒序的列表共用）
//!
//! 1. 解码游标得到排序值 `v`（或无）
//! 2. 向数据源取 `limit + 1` 条严格早于 `v` 的记录（倒序）
//! 3. 取满 `limit + 1` 条则 `has_next = true`，截断到 `limit`，
//!    下一页游标为第 `limit` 条记录的排序值
//!
//! 排序值不唯一时（同一秒内的多条记录）跨页边界可能漏读，这是已知限制。

use serde::{Deserialize, Serialize};

use crate::cursor::CursorCodec;

/// 分页响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    pub next_cursor: Option<String>,
    pub count: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_next: false,
            next_cursor: None,
            count: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        let items: Vec<U> = self.items.into_iter().map(f).collect();
        Page {
            count: items.len(),
            items,
            has_next: self.has_next,
            next_cursor: self.next_cursor,
        }
    }

    /// 用新的条目替换（例如回查后丢弃了已删除的记录），保留分页元数据
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            count: items.len(),
            items,
            has_next: self.has_next,
            next_cursor: self.next_cursor,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// 分页请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn new(limit: usize, cursor: Option<String>) -> Self {
        Self {
            limit: Some(limit),
            cursor,
        }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(limit, None)
    }

    /// 缺省取 `default_limit`，并限制在 `1..=max_limit`
    pub fn effective_limit(&self, default_limit: usize, max_limit: usize) -> usize {
        self.limit
            .unwrap_or(default_limit)
            .clamp(1, max_limit.max(1))
    }

    /// 解码后的排序值；无效游标视为缺失
    pub fn after(&self) -> Option<i64> {
        CursorCodec::decode(self.cursor.as_deref())
    }
}

/// 把取回的 `limit + 1` 条记录整理成一页
pub fn paginate<T>(mut fetched: Vec<T>, limit: usize, ordering_value: impl Fn(&T) -> i64) -> Page<T> {
    let limit = limit.max(1);
    let has_next = fetched.len() > limit;
    fetched.truncate(limit);

    let next_cursor = if has_next {
        fetched
            .last()
            .map(|item| CursorCodec::encode(ordering_value(item)))
    } else {
        None
    };

    Page {
        count: fetched.len(),
        items: fetched,
        has_next,
        next_cursor,
    }
}
