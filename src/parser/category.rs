// ==========================================
// 出入库批量指令 - 物料分类器
// ==========================================
// 职责: 物料名 -> 分类（纯函数，可替换）
// 规则: 关键词表 (有序) + 优先级规则 + 子分类映射
// 兜底: 取首个描述性词作为新分类，否则 "Other"
// ==========================================

/// 物料分类器接口
pub trait CategoryClassifier: Send + Sync {
    /// 对物料名分类，返回形如 "Plumbing" 或 "Electrical > Cables" 的分类
    fn classify(&self, item_name: &str) -> String;
}

/// 空名称的分类
pub const UNCATEGORIZED: &str = "Uncategorized";

/// 无法推断时的分类
pub const OTHER: &str = "Other";

// 关键词 -> 分类（按顺序匹配，先命中者生效）
const CATEGORY_RULES: &[(&str, &str)] = &[
    // 涂料
    ("paint", "Paint"),
    ("coating", "Paint"),
    ("varnish", "Paint"),
    ("primer", "Paint"),
    ("enamel", "Paint"),
    ("lacquer", "Paint"),
    // 电气
    ("wire", "Electrical > Cables"),
    ("cable", "Electrical > Cables"),
    ("switch", "Electrical > Switches"),
    ("outlet", "Electrical > Outlets"),
    ("socket", "Electrical > Outlets"),
    ("bulb", "Lamps and Bulbs"),
    ("lamp", "Lamps and Bulbs"),
    ("light", "Lamps and Bulbs"),
    ("led", "Lamps and Bulbs"),
    ("fluorescent", "Lamps and Bulbs"),
    ("adapter", "Adapters"),
    ("connector", "Electrical > Components"),
    ("fuse", "Electrical > Components"),
    ("breaker", "Electrical > Components"),
    // 给排水
    ("pipe", "Plumbing"),
    ("fitting", "Plumbing"),
    ("valve", "Plumbing"),
    ("faucet", "Plumbing"),
    ("tap", "Plumbing"),
    ("toilet", "Toilet Items"),
    ("sink", "Plumbing"),
    ("drain", "Plumbing"),
    ("shower", "Plumbing"),
    // 工具
    ("hammer", "Tools"),
    ("screwdriver", "Tools"),
    ("wrench", "Tools"),
    ("pliers", "Tools"),
    ("drill", "Tools"),
    ("saw", "Tools"),
    ("level", "Tools"),
    ("tape", "Tools"),
    ("measure", "Tools"),
    ("tool", "Tools"),
    // 安全防护
    ("helmet", "Safety Equipment"),
    ("safety", "Safety Equipment"),
    ("glove", "Safety Equipment"),
    ("goggle", "Safety Equipment"),
    ("vest", "Safety Equipment"),
    ("boot", "Safety Equipment"),
    ("mask", "Safety Equipment"),
    ("harness", "Safety Equipment"),
    // 木作
    ("wood", "Carpentry"),
    ("plywood", "Carpentry"),
    ("mdf", "Carpentry"),
    ("timber", "Carpentry"),
    ("board", "Carpentry"),
    ("lumber", "Carpentry"),
    ("nail", "Carpentry"),
    ("screw", "Carpentry"),
    ("bolt", "Carpentry"),
    // 钢材
    ("steel", "Steel"),
    ("metal", "Steel"),
    ("iron", "Steel"),
    ("aluminum", "Steel"),
    ("copper", "Steel"),
    ("beam", "Steel"),
    ("plate", "Steel"),
    ("sheet", "Steel"),
    ("bar", "Steel"),
    // 建材
    ("cement", "Construction Materials"),
    ("concrete", "Construction Materials"),
    ("sand", "Construction Materials"),
    ("gravel", "Construction Materials"),
    ("brick", "Construction Materials"),
    ("block", "Construction Materials"),
    ("tile", "Construction Materials"),
    ("grout", "Construction Materials"),
    ("mortar", "Construction Materials"),
];

// 优先级规则: 优先关键词与任一冲突词同时出现时，优先关键词的分类生效
const PRIORITY_RULES: &[(&str, &[&str])] = &[
    ("paint", &["electrical", "power", "voltage"]),
    ("tool", &["electrical", "power"]),
    ("pipe", &["electrical", "wire"]),
    ("safety", &["electrical", "plumbing", "tools"]),
];

// 主分类 -> (子关键词, 子分类)
const SUBCATEGORY_RULES: &[(&str, &[(&str, &str)])] = &[
    (
        "Paint",
        &[
            ("interior", "Interior Paint"),
            ("exterior", "Exterior Paint"),
            ("primer", "Primer"),
            ("varnish", "Varnish"),
            ("enamel", "Enamel"),
        ],
    ),
    (
        "Plumbing",
        &[
            ("pipe", "Pipes"),
            ("fitting", "Fittings"),
            ("valve", "Valves"),
            ("fixture", "Fixtures"),
        ],
    ),
    (
        "Tools",
        &[
            ("hand", "Hand Tools"),
            ("power", "Power Tools"),
            ("measuring", "Measuring Tools"),
        ],
    ),
    (
        "Safety Equipment",
        &[
            ("head", "Head Protection"),
            ("eye", "Eye Protection"),
            ("hand", "Hand Protection"),
            ("body", "Body Protection"),
        ],
    ),
    (
        "Lamps and Bulbs",
        &[
            ("led", "LED Bulbs"),
            ("fluorescent", "Fluorescent"),
            ("floodlight", "Floodlights"),
        ],
    ),
    (
        "Adapters",
        &[
            ("power", "Power Adapters"),
            ("pipe", "Pipe Adapters"),
            ("cable", "Cable Adapters"),
        ],
    ),
    (
        "Toilet Items",
        &[
            ("seat", "Toilet Seats"),
            ("tank", "Toilet Tanks"),
            ("bowl", "Toilet Bowls"),
        ],
    ),
    (
        "Steel",
        &[
            ("beam", "Beams"),
            ("pipe", "Pipes"),
            ("sheet", "Sheets"),
            ("bar", "Bars"),
        ],
    ),
];

// 兜底分类时跳过的词
const FALLBACK_SKIP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "new", "old", "ltrs", "ltr", "kg", "kgs", "ton", "tons",
    "piece", "pieces", "pcs", "bag", "bags", "box", "boxes", "roll", "rolls", "set", "sets",
];

// ==========================================
// KeywordCategoryClassifier - 关键词分类器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct KeywordCategoryClassifier;

impl KeywordCategoryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 词是否命中关键词: 全等、复数形式、或以关键词结尾的复合词 (floodlight)
    fn word_matches(word: &str, keyword: &str) -> bool {
        if word == keyword {
            return true;
        }
        if let Some(rest) = word.strip_prefix(keyword) {
            if rest == "s" || rest == "es" {
                return true;
            }
        }
        keyword.len() >= 4 && word.ends_with(keyword)
    }

    fn contains_keyword(words: &[String], keyword: &str) -> bool {
        words.iter().any(|w| Self::word_matches(w, keyword))
    }

    fn apply_priority(words: &[String], detected: &'static str) -> &'static str {
        for (priority_kw, conflicts) in PRIORITY_RULES {
            if !Self::contains_keyword(words, priority_kw) {
                continue;
            }
            let conflicting = conflicts.iter().any(|c| Self::contains_keyword(words, c));
            if conflicting {
                if let Some((_, category)) = CATEGORY_RULES.iter().find(|(kw, _)| kw == priority_kw) {
                    return *category;
                }
            }
        }
        detected
    }

    fn add_subcategory(words: &[String], category: &str) -> String {
        if category.contains(" > ") {
            return category.to_string();
        }
        let sub_rules = SUBCATEGORY_RULES
            .iter()
            .find(|(main, _)| *main == category)
            .map(|(_, subs)| *subs);

        if let Some(subs) = sub_rules {
            for (sub_kw, sub_category) in subs {
                if Self::contains_keyword(words, sub_kw) {
                    return format!("{} > {}", category, sub_category);
                }
            }
        }
        category.to_string()
    }

    fn fallback_category(item_name: &str) -> String {
        item_name
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .find(|w| {
                w.chars().count() > 2
                    && !w.chars().any(|c| c.is_ascii_digit())
                    && !FALLBACK_SKIP_WORDS.contains(&w.to_lowercase().as_str())
            })
            .map(title_case)
            .unwrap_or_else(|| OTHER.to_string())
    }
}

impl CategoryClassifier for KeywordCategoryClassifier {
    fn classify(&self, item_name: &str) -> String {
        let trimmed = item_name.trim();
        if trimmed.is_empty() {
            return UNCATEGORIZED.to_string();
        }

        let words: Vec<String> = trimmed
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .collect();

        let detected = CATEGORY_RULES
            .iter()
            .find(|(kw, _)| Self::contains_keyword(&words, kw))
            .map(|(_, category)| *category);

        match detected {
            Some(category) => {
                let category = Self::apply_priority(&words, category);
                Self::add_subcategory(&words, category)
            }
            None => Self::fallback_category(trimmed),
        }
    }
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(name: &str) -> String {
        KeywordCategoryClassifier::new().classify(name)
    }

    #[test]
    fn test_keyword_categories() {
        assert_eq!(classify("Portland cement"), "Construction Materials");
        assert_eq!(classify("Copper wires 2.5mm"), "Electrical > Cables");
        assert_eq!(classify("Steel beam 9m"), "Steel > Beams");
        assert_eq!(classify("PVC pipe 20mm"), "Plumbing > Pipes");
        assert_eq!(classify("Measuring tape"), "Tools > Measuring Tools");
    }

    #[test]
    fn test_compound_word_match() {
        assert_eq!(classify("Solar floodlight"), "Lamps and Bulbs > Floodlights");
    }

    #[test]
    fn test_priority_rules() {
        // paint 与 power 同时出现时 paint 优先
        assert_eq!(classify("Power paint sprayer coating"), "Paint");
        // safety 与 tools 同时出现时 safety 优先
        assert_eq!(classify("Safety tools kit"), "Safety Equipment");
    }

    #[test]
    fn test_fallback_category() {
        assert_eq!(classify("  "), UNCATEGORIZED);
        assert_eq!(classify("50 kg"), OTHER);
        assert_eq!(classify("rubber membrane"), "Rubber");
    }
}
