// ==========================================
// 出入库批量指令 - 批量格式识别
// ==========================================
// 判定顺序 (先命中者生效):
// 1. 至少两行 "-batch N-" 分段标记        => MultiBatch
// 2. 至少两行以变动类型前缀开头 (/in ...)  => Mixed
// 3. 同时含换行与分号                      => Mixed
// 4. 仅含换行                              => Newline
// 5. 仅含分号                              => Semicolon
// 6. 其他                                  => Single
// 说明: 逗号只分隔字段，不构成批量
// ==========================================

use crate::domain::types::BatchFormat;
use regex::Regex;
use std::sync::OnceLock;

/// 分段标记 "-batch 1-" / "- Batch A -"
pub(crate) fn batch_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*-+\s*batch\s+([A-Za-z0-9_]+)\s*-+\s*$").expect("invalid batch marker regex")
    })
}

/// 行首变动类型前缀 (必须带斜杠)
pub(crate) fn entry_kind_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*/(in|out|adjust|receipt|issue|adjustment)\b[\s:]*")
            .expect("invalid entry prefix regex")
    })
}

// ==========================================
// FormatDetector - 格式识别器
// ==========================================
pub struct FormatDetector;

impl FormatDetector {
    /// 识别批量格式
    ///
    /// # 参数
    /// - text: 去掉指令前缀与表头后的正文
    pub fn detect(text: &str) -> BatchFormat {
        let trimmed = text.trim();
        let lines: Vec<&str> = trimmed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let marker_lines = lines.iter().filter(|l| batch_marker_re().is_match(l)).count();
        if marker_lines >= 2 {
            return BatchFormat::MultiBatch;
        }

        let prefixed_lines = lines
            .iter()
            .filter(|l| entry_kind_prefix_re().is_match(l))
            .count();
        if prefixed_lines >= 2 {
            return BatchFormat::Mixed;
        }

        let has_newline = lines.len() > 1;
        let has_semicolon = trimmed.contains(';');

        match (has_newline, has_semicolon) {
            (true, true) => BatchFormat::Mixed,
            (true, false) => BatchFormat::Newline,
            (false, true) => BatchFormat::Semicolon,
            (false, false) => BatchFormat::Single,
        }
    }
}
