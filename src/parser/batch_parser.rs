// ==========================================
// 出入库批量指令 - 批次解析编排
// ==========================================
// 流程: 指令前缀 -> 表头参数 -> 格式识别 -> 分段 -> 条目解析
// 说明:
// - 单行解析失败只记录该行错误，继续解析其余行
// - 空行与注释行 (#, //) 不计入条目
// - 存在 "-batch N-" 标记时按分段解析，分段表头覆盖指令级表头
// ==========================================

use crate::domain::movement::{EntryParseFailure, ParsedBatch};
use crate::domain::types::{BatchFormat, MovementKind};
use crate::parser::category::{CategoryClassifier, KeywordCategoryClassifier};
use crate::parser::entry_parser::EntryParser;
use crate::parser::error::ParseError;
use crate::parser::format_detector::{batch_marker_re, FormatDetector};
use crate::parser::global_params::GlobalParameterExtractor;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

fn command_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*/?(in|out|adjust|receipt|issue|adjustment)\b[ \t:]*(.*)$")
            .expect("invalid command prefix regex")
    })
}

/// 拆分指令前缀
///
/// # 返回
/// - (变动类型, 前缀之后的文本)；无前缀时类型为 None、文本原样返回
pub fn split_command_prefix(text: &str) -> (Option<MovementKind>, &str) {
    match command_prefix_re().captures(text) {
        Some(caps) => {
            let kind = caps
                .get(1)
                .and_then(|m| MovementKind::from_command_token(m.as_str()));
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            (kind, rest)
        }
        None => (None, text),
    }
}

/// 多批次分段
struct Section<'a> {
    label: Option<String>,
    lines: Vec<&'a str>,
}

fn split_sections(body: &str) -> Vec<Section<'_>> {
    let mut sections = vec![Section {
        label: None,
        lines: Vec::new(),
    }];

    for line in body.lines() {
        if let Some(caps) = batch_marker_re().captures(line) {
            let label = caps.get(1).map(|m| m.as_str().to_string());
            sections.push(Section {
                label,
                lines: Vec::new(),
            });
        } else if let Some(current) = sections.last_mut() {
            current.lines.push(line);
        }
    }

    // 首个无标记分段为空时丢弃
    if sections.len() > 1 && sections[0].lines.iter().all(|l| l.trim().is_empty()) {
        sections.remove(0);
    }
    sections
}

/// 按换行与分号拆分条目，过滤空行与注释
fn split_entries(text: &str) -> Vec<&str> {
    text.lines()
        .flat_map(|line| line.split(';'))
        .map(str::trim)
        .filter(|e| !e.is_empty() && !e.starts_with('#') && !e.starts_with("//"))
        .collect()
}

// ==========================================
// BatchParser - 批次解析器
// ==========================================
#[derive(Clone)]
pub struct BatchParser {
    classifier: Arc<dyn CategoryClassifier>,
}

impl Default for BatchParser {
    fn default() -> Self {
        Self::new(Arc::new(KeywordCategoryClassifier::new()))
    }
}

impl BatchParser {
    /// 创建解析器
    ///
    /// # 参数
    /// - classifier: 物料分类器
    pub fn new(classifier: Arc<dyn CategoryClassifier>) -> Self {
        Self { classifier }
    }

    /// 解析完整指令 (类型取自指令前缀)
    pub fn parse(&self, text: &str) -> ParsedBatch {
        self.parse_with_kind(text, None)
    }

    /// 解析完整指令
    ///
    /// # 参数
    /// - text: 原始指令文本
    /// - default_kind: 指令无前缀时采用的变动类型
    pub fn parse_with_kind(&self, text: &str, default_kind: Option<MovementKind>) -> ParsedBatch {
        let mut batch = ParsedBatch {
            movement_kind: None,
            format: BatchFormat::Single,
            globals: Default::default(),
            entries: Vec::new(),
            errors: Vec::new(),
            is_consistent: false,
        };

        if text.trim().is_empty() {
            batch.errors.push(EntryParseFailure {
                line: 0,
                raw_text: String::new(),
                error: ParseError::EmptyCommand,
            });
            return batch;
        }

        let (prefix_kind, rest) = split_command_prefix(text);
        let Some(kind) = prefix_kind.or(default_kind) else {
            batch.errors.push(EntryParseFailure {
                line: 0,
                raw_text: text.trim().to_string(),
                error: ParseError::MissingMovementKind,
            });
            return batch;
        };
        batch.movement_kind = Some(kind);

        let (command_globals, body) = GlobalParameterExtractor::extract(rest);
        batch.format = FormatDetector::detect(&body);
        batch.globals = command_globals.resolve(kind);

        let entry_parser = EntryParser::new(self.classifier.as_ref());
        let mut line_no = 0usize;

        for section in split_sections(&body) {
            let section_text = section.lines.join("\n");
            let (section_globals, section_body) = match section.label {
                Some(_) => {
                    let (raw, body) = GlobalParameterExtractor::extract(&section_text);
                    (command_globals.overlay(&raw), body)
                }
                None => (command_globals.clone(), section_text),
            };
            let globals = section_globals.resolve(kind);

            let entries = split_entries(&section_body);
            if entries.is_empty() {
                if let Some(label) = &section.label {
                    batch.errors.push(EntryParseFailure {
                        line: line_no,
                        raw_text: format!("-batch {}-", label),
                        error: ParseError::EmptySection {
                            section: label.clone(),
                        },
                    });
                }
                continue;
            }

            for entry_text in entries {
                line_no += 1;
                match entry_parser.parse_entry(
                    entry_text,
                    line_no,
                    kind,
                    &globals,
                    section.label.as_deref(),
                ) {
                    Ok(movement) => batch.entries.push(movement),
                    Err(error) => {
                        debug!(line = line_no, code = error.code(), "条目解析失败");
                        batch.errors.push(EntryParseFailure {
                            line: line_no,
                            raw_text: entry_text.to_string(),
                            error,
                        });
                    }
                }
            }
        }

        batch.refresh_consistency();
        debug!(
            kind = kind.as_str(),
            format = batch.format.as_str(),
            entries = batch.entries.len(),
            errors = batch.errors.len(),
            "指令解析完成"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_command_prefix() {
        assert_eq!(
            split_command_prefix("/in cement, 5"),
            (Some(MovementKind::Receipt), "cement, 5")
        );
        assert_eq!(
            split_command_prefix("OUT project: A\nsand, 2").0,
            Some(MovementKind::Issue)
        );
        assert_eq!(split_command_prefix("Insulation tape, 4").0, None);
    }

    #[test]
    fn test_single_entry_command() {
        let batch = BatchParser::default().parse("/in project: Bridge Construction, cement, 50 bags");
        assert_eq!(batch.format, BatchFormat::Single);
        assert!(batch.is_consistent);
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.entries[0].item_name, "cement");
        assert_eq!(batch.entries[0].project.as_deref(), Some("Bridge Construction"));
    }

    #[test]
    fn test_newline_batch_with_header() {
        let text = "/out project: Tower, driver: Sam, to: Site 4\ncement, 10 bags\nsand, 2 tons";
        let batch = BatchParser::default().parse(text);
        assert_eq!(batch.movement_kind, Some(MovementKind::Issue));
        assert_eq!(batch.format, BatchFormat::Newline);
        assert_eq!(batch.entries.len(), 2);
        for entry in &batch.entries {
            assert_eq!(entry.driver.as_deref(), Some("Sam"));
            assert_eq!(entry.to_location.as_deref(), Some("Site 4"));
        }
        assert_eq!(batch.entries[1].line, 2);
    }

    #[test]
    fn test_parse_error_does_not_stop_other_lines() {
        let text = "/in project: Tower\ncement, 10 bags\nsome gravel\nsand, 2 tons";
        let batch = BatchParser::default().parse(text);
        assert_eq!(batch.entries.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].line, 2);
        assert!(!batch.is_consistent);
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let text = "/in project: Tower\n\n# delivery note 14\ncement, 10 bags\n// checked\n";
        let batch = BatchParser::default().parse(text);
        assert_eq!(batch.entry_count(), 1);
        assert!(batch.is_consistent);
    }

    #[test]
    fn test_multi_batch_sections() {
        let text = "/in driver: Tom\n-batch 1-\nproject: Alpha\ncement, 5 bags\n-batch 2-\nproject: Beta, to: Yard\nsand, 3 tons\ngravel, 1 ton";
        let batch = BatchParser::default().parse(text);
        assert_eq!(batch.format, BatchFormat::MultiBatch);
        assert_eq!(batch.entries.len(), 3);
        assert_eq!(batch.entries[0].project.as_deref(), Some("Alpha"));
        assert_eq!(batch.entries[0].section.as_deref(), Some("1"));
        assert_eq!(batch.entries[1].project.as_deref(), Some("Beta"));
        assert_eq!(batch.entries[2].driver.as_deref(), Some("Tom"));
        assert_eq!(batch.entries[2].line, 3);
    }

    #[test]
    fn test_missing_kind() {
        let batch = BatchParser::default().parse("cement, 5");
        assert_eq!(batch.movement_kind, None);
        assert_eq!(batch.errors[0].error, ParseError::MissingMovementKind);

        let batch = BatchParser::default().parse_with_kind("cement, 5", Some(MovementKind::Receipt));
        assert_eq!(batch.entries[0].quantity, Decimal::new(5, 0));
    }

    #[test]
    fn test_mixed_kinds_break_consistency() {
        let batch = BatchParser::default().parse("/in project: A\n/in cement, 5\n/out sand, 3");
        assert_eq!(batch.format, BatchFormat::Mixed);
        assert_eq!(batch.entries.len(), 2);
        assert!(!batch.is_consistent);
    }
}
