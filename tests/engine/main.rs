//! 规则匹配引擎端到端测试
//!
//! 测试覆盖：
//! - 匹配结果排序与缓存幂等
//! - 索引剪枝的完备性
//! - 动态内容回退
//! - 规则与内容热重载
//! - 共享缓存层

mod data;
mod helpers;
mod suites;
