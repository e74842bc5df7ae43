//! 测试辅助实现

use async_trait::async_trait;
use rule_engine::{AdapterError, CacheEntry, ContentAdapter, FactRecord, SharedCacheBackend};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 每次调用返回递增序号的适配器，用于观察是否重新计算
#[derive(Default)]
pub struct CountingAdapter {
    calls: AtomicUsize,
}

impl CountingAdapter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentAdapter for CountingAdapter {
    fn resolve(&self, method: &str, _fact: &FactRecord) -> Result<Value, AdapterError> {
        match method {
            "next" => {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({"type": "text", "text": format!("call-{}", n)}))
            }
            "fail" => Err(AdapterError::Failed("upstream down".to_string())),
            other => Err(AdapterError::UnknownMethod(other.to_string())),
        }
    }
}

/// 内存共享缓存，模拟多个进程共用的 Redis
#[derive(Default)]
pub struct MemorySharedCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    down: AtomicBool,
}

impl MemorySharedCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> rule_engine::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(rule_engine::RuleError::CacheBackend("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedCacheBackend for MemorySharedCache {
    async fn get(&self, key: &str) -> rule_engine::Result<Option<CacheEntry>> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, entry: &CacheEntry, _ttl_secs: u64) -> rule_engine::Result<()> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn invalidate_all(&self) -> rule_engine::Result<usize> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}
