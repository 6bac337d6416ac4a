// ==========================================
// 出入库批量指令 - 查重引擎
// ==========================================
// 职责: 将批次条目与整个台账比对，输出自动关联、疑似重复与库存告警
// 规则:
// 1. 规范化: 小写，规格 token (50kg / 9 m) 单独提取，标点转空格
// 2. 关键词: 去停用词与单字符词后的词集合（与词序无关）
// 3. 候选: 命中 >= 1 且 命中 >= 条目关键词数 - max_missing_keywords
// 4. 评分: eligible_floor + overlap_weight * 命中率 (+前缀/包含加分)，封顶 1.0
// 5. 规格冲突: 关键词全中记 measurement_mismatch_score，否则 0
// 红线: 查重结果只做提示，不阻断审批
// ==========================================

use crate::config::DuplicateConfig;
use crate::domain::annotation::{
    EntryAnnotation, ItemLink, PotentialDuplicate, StockInsufficiencyWarning,
};
use crate::domain::item::{name_key, CatalogItem};
use crate::domain::movement::{CandidateMovement, ParsedBatch};
use crate::domain::types::MovementKind;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by", "a", "an", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should",
];

fn measurement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:^|[^a-z0-9.])(\d+(?:\.\d+)?)\s*(mm|cm|km|m|kg|mg|g|tons|ton|t|ml|ltr|l|inch|in|ft|kva|kw|w|v)\b",
        )
        .expect("invalid measurement regex")
    })
}

/// 规格 (数值 + 归一化单位)
#[derive(Debug, Clone, PartialEq)]
struct Measurement {
    value: f64,
    unit: &'static str,
}

fn canonical_measure_unit(raw: &str) -> &'static str {
    match raw.to_lowercase().as_str() {
        "mm" => "mm",
        "cm" => "cm",
        "km" => "km",
        "m" => "m",
        "kg" => "kg",
        "mg" => "mg",
        "g" => "g",
        "t" | "ton" | "tons" => "t",
        "ml" => "ml",
        "l" | "ltr" => "l",
        "in" | "inch" => "in",
        "ft" => "ft",
        "kva" => "kva",
        "kw" => "kw",
        "w" => "w",
        _ => "v",
    }
}

// ==========================================
// NameProfile - 名称特征
// ==========================================
#[derive(Debug, Clone)]
struct NameProfile {
    normalized: String,
    keywords: BTreeSet<String>,
    measurements: Vec<Measurement>,
}

impl NameProfile {
    fn build(name: &str) -> Self {
        let lowered = name.to_lowercase();

        let mut measurements = Vec::new();
        let mut stripped = String::with_capacity(lowered.len());
        let mut last = 0;
        for caps in measurement_re().captures_iter(&lowered) {
            let (Some(value), Some(unit)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if let Ok(v) = value.as_str().parse::<f64>() {
                measurements.push(Measurement {
                    value: v,
                    unit: canonical_measure_unit(unit.as_str()),
                });
            }
            stripped.push_str(&lowered[last..value.start()]);
            stripped.push(' ');
            last = unit.end();
        }
        stripped.push_str(&lowered[last..]);

        let normalized = DuplicateDetector::normalize(&lowered);
        let keywords = DuplicateDetector::normalize(&stripped)
            .split_whitespace()
            .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(w))
            .map(|w| w.to_string())
            .collect();

        Self {
            normalized,
            keywords,
            measurements,
        }
    }
}

// ==========================================
// DuplicateDetector - 查重引擎
// ==========================================
pub struct DuplicateDetector {
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self { config }
    }

    /// 规范化: 小写、标点转空格、压缩空白
    pub fn normalize(text: &str) -> String {
        text.to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 提取关键词集合
    pub fn keywords(name: &str) -> BTreeSet<String> {
        NameProfile::build(name).keywords
    }

    /// 计算两个名称的相似度 [0, 1]
    ///
    /// # 参数
    /// - candidate: 条目中的名称（命中率的分母取其关键词数）
    /// - existing: 台账中的名称
    pub fn similarity(&self, candidate: &str, existing: &str) -> f64 {
        self.score(&NameProfile::build(candidate), &NameProfile::build(existing))
    }

    fn score(&self, candidate: &NameProfile, existing: &NameProfile) -> f64 {
        if !candidate.normalized.is_empty() && candidate.normalized == existing.normalized {
            return 1.0;
        }

        let total = candidate.keywords.len();
        if total == 0 {
            return 0.0;
        }
        let overlap = candidate.keywords.intersection(&existing.keywords).count();
        if overlap == 0 || overlap + self.config.max_missing_keywords < total {
            return 0.0;
        }

        let full_match = overlap == total;
        if !self.measurements_agree(&candidate.measurements, &existing.measurements) {
            return if full_match {
                self.config.measurement_mismatch_score
            } else {
                0.0
            };
        }

        let mut score =
            self.config.eligible_floor + self.config.overlap_weight * (overlap as f64 / total as f64);

        let unmatched_a: Vec<&String> = candidate.keywords.difference(&existing.keywords).collect();
        let unmatched_b: Vec<&String> = existing.keywords.difference(&candidate.keywords).collect();
        let prefixed = unmatched_a.iter().any(|a| {
            unmatched_b
                .iter()
                .any(|b| a.starts_with(b.as_str()) || b.starts_with(a.as_str()))
        });
        if prefixed {
            score += self.config.prefix_boost;
        }

        if candidate.keywords.is_subset(&existing.keywords)
            || existing.keywords.is_subset(&candidate.keywords)
        {
            score += self.config.containment_boost;
        }

        score.min(1.0)
    }

    /// 规格一致: 双方都无规格，或同单位数值在容差内一一对应
    fn measurements_agree(&self, a: &[Measurement], b: &[Measurement]) -> bool {
        if a.is_empty() && b.is_empty() {
            return true;
        }
        if a.len() != b.len() {
            return false;
        }
        let tolerance = self.config.measurement_tolerance;
        let close = |x: &Measurement, y: &Measurement| {
            let scale = x.value.abs().max(y.value.abs());
            x.unit == y.unit && (scale == 0.0 || (x.value - y.value).abs() <= tolerance * scale)
        };
        a.iter().all(|x| b.iter().any(|y| close(x, y)))
            && b.iter().all(|y| a.iter().any(|x| close(x, y)))
    }

    /// 在台账中查找疑似重复（按得分降序，最多 max_candidates 个）
    pub fn find_candidates(&self, name: &str, catalog: &[CatalogItem]) -> Vec<PotentialDuplicate> {
        let profile = NameProfile::build(name);
        let profiles: Vec<(NameProfile, &CatalogItem)> = catalog
            .iter()
            .map(|item| (NameProfile::build(&item.name), item))
            .collect();
        self.rank(name, &profile, &profiles, false)
    }

    fn rank(
        &self,
        name: &str,
        profile: &NameProfile,
        catalog: &[(NameProfile, &CatalogItem)],
        with_on_hand: bool,
    ) -> Vec<PotentialDuplicate> {
        let key = name_key(name);
        let mut found: Vec<PotentialDuplicate> = catalog
            .iter()
            .filter(|(_, item)| name_key(&item.name) != key)
            .filter_map(|(other, item)| {
                let score = self.score(profile, other);
                (score >= self.config.threshold).then(|| PotentialDuplicate {
                    candidate_name: name.to_string(),
                    matched_item: item.name.clone(),
                    similarity_score: score,
                    current_on_hand: with_on_hand.then_some(item.on_hand),
                })
            })
            .collect();

        found.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.matched_item.cmp(&b.matched_item))
        });
        found.truncate(self.config.max_candidates);
        found
    }

    /// 对批次全部条目做查重标注
    ///
    /// # 规则
    /// - 名称精确匹配（忽略大小写与空白）: 自动关联，不再给出疑似项
    /// - 出库: 关联物料库存不足时给出告警；疑似项附带当前库存
    /// - 出库/调整: 既无关联也无疑似项时标记为未知物料
    pub fn annotate(&self, batch: &ParsedBatch, catalog: &[CatalogItem]) -> Vec<EntryAnnotation> {
        let profiles: Vec<(NameProfile, &CatalogItem)> = catalog
            .iter()
            .map(|item| (NameProfile::build(&item.name), item))
            .collect();

        batch
            .entries
            .iter()
            .map(|entry| self.annotate_entry(entry, catalog, &profiles))
            .collect()
    }

    fn annotate_entry(
        &self,
        entry: &CandidateMovement,
        catalog: &[CatalogItem],
        profiles: &[(NameProfile, &CatalogItem)],
    ) -> EntryAnnotation {
        let key = name_key(&entry.item_name);
        let exact = catalog.iter().find(|item| name_key(&item.name) == key);
        let is_issue = entry.movement_kind == MovementKind::Issue;

        let (link, duplicates, stock_warning) = match exact {
            Some(item) => {
                let warning = (is_issue && entry.quantity > item.on_hand).then(|| {
                    StockInsufficiencyWarning {
                        item_name: item.name.clone(),
                        requested: entry.quantity,
                        on_hand: item.on_hand,
                    }
                });
                (
                    ItemLink::Existing {
                        item_name: item.name.clone(),
                    },
                    Vec::new(),
                    warning,
                )
            }
            None => {
                let profile = NameProfile::build(&entry.item_name);
                let duplicates = self.rank(&entry.item_name, &profile, profiles, is_issue);
                (ItemLink::Unmatched, duplicates, None)
            }
        };

        let unknown_item = entry.movement_kind != MovementKind::Receipt
            && exact.is_none()
            && duplicates.is_empty();

        if !duplicates.is_empty() {
            debug!(
                line = entry.line,
                item = %entry.item_name,
                candidates = duplicates.len(),
                "发现疑似重复物料"
            );
        }

        EntryAnnotation {
            line: entry.line,
            original_name: entry.item_name.clone(),
            link,
            duplicates,
            stock_warning,
            unknown_item,
        }
    }

    /// 将自动关联的条目改写为台账规范名称
    ///
    /// # 返回
    /// - 改写的条目数
    pub fn apply_links(batch: &mut ParsedBatch, annotations: &[EntryAnnotation]) -> usize {
        let mut renamed = 0;
        for entry in batch.entries.iter_mut() {
            let linked = annotations
                .iter()
                .find(|a| a.line == entry.line)
                .and_then(|a| a.linked_name());
            if let Some(canonical) = linked {
                if entry.item_name != canonical {
                    entry.item_name = canonical.to_string();
                    renamed += 1;
                }
            }
        }
        renamed
    }
}
