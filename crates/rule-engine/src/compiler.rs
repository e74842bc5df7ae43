//! 规则编译器
//!
//! 将存储中的规则行解析为执行结构：条件树、内容规格和索引键。
//! 无法解析的规则返回 `MalformedRule`，由批量编译跳过并记录日志。

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::condition::ConditionNode;
use crate::error::{Result, RuleError};
use crate::index::{IndexKey, witness_keys};
use crate::models::{ContentSpec, RuleRecord};

/// 编译后的规则
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub code: String,
    pub name: String,
    pub rule_type: String,
    pub priority: i32,
    pub version: i64,
    pub conditions: ConditionNode,
    pub content: ContentSpec,
    /// 见证键：规则为真时事实记录必然产生其中至少一个键；None 表示进入兜底桶
    pub index_keys: Option<BTreeSet<IndexKey>>,
}

/// 批量编译结果
#[derive(Debug, Default)]
pub struct CompileReport {
    pub rules: Vec<CompiledRule>,
    pub disabled: usize,
    pub malformed: Vec<RuleError>,
    pub duplicates: Vec<String>,
}

impl CompileReport {
    pub fn skipped(&self) -> usize {
        self.disabled + self.malformed.len() + self.duplicates.len()
    }
}

/// 规则编译器
#[derive(Debug, Default)]
pub struct RuleCompiler;

impl RuleCompiler {
    pub fn new() -> Self {
        Self
    }

    /// 编译单条规则
    pub fn compile(&self, record: RuleRecord) -> Result<CompiledRule> {
        let malformed = |reason: String| RuleError::MalformedRule {
            code: record.code.clone(),
            reason,
        };

        if record.code.trim().is_empty() {
            return Err(malformed("规则编码不能为空".to_string()));
        }
        if record.rule_type.trim().is_empty() {
            return Err(malformed("规则类型不能为空".to_string()));
        }

        let conditions =
            ConditionNode::parse(&record.conditions).map_err(|e| malformed(e.to_string()))?;
        let content: ContentSpec = serde_json::from_value(record.content.clone())
            .map_err(|e| malformed(format!("内容规格无效: {}", e)))?;

        if let ContentSpec::Dynamic { adapter, method, .. } = &content {
            if adapter.is_empty() || method.is_empty() {
                return Err(malformed("动态内容必须指定 adapter 与 method".to_string()));
            }
        }

        let unsupported = conditions.unsupported_kinds();
        if !unsupported.is_empty() {
            warn!(
                code = %record.code,
                kinds = ?unsupported,
                "规则包含未识别的条件类型，相关分支按不满足处理"
            );
        }

        let index_keys = witness_keys(&conditions).filter(|keys| !keys.is_empty());

        Ok(CompiledRule {
            code: record.code,
            name: record.name,
            rule_type: record.rule_type,
            priority: record.priority,
            version: record.version,
            conditions,
            content,
            index_keys,
        })
    }

    /// 编译整批规则
    ///
    /// 禁用的规则、格式错误的规则和重复编码的后出现者都被跳过，
    /// 不影响其余规则。
    pub fn compile_all(&self, records: Vec<RuleRecord>) -> CompileReport {
        let mut report = CompileReport::default();
        let mut seen = HashSet::with_capacity(records.len());

        for record in records {
            if !record.enabled {
                report.disabled += 1;
                continue;
            }
            // 首次出现即占用编码，即使它随后编译失败
            if !seen.insert(record.code.clone()) {
                warn!(code = %record.code, "重复的规则编码，忽略后出现的规则");
                report.duplicates.push(record.code);
                continue;
            }

            let code = record.code.clone();
            match self.compile(record) {
                Ok(rule) => report.rules.push(rule),
                Err(e) => {
                    warn!(code = %code, error = %e, "规则格式错误，已跳过");
                    report.malformed.push(e);
                }
            }
        }

        debug!(
            compiled = report.rules.len(),
            skipped = report.skipped(),
            "规则编译完成"
        );
        report
    }
}
