// ==========================================
// 出入库批量指令 - 全局参数提取
// ==========================================
// 职责: 从指令表头读取 project / driver / from / to / office
// 规则:
// - 键不区分大小写，以 "key: value" 形式出现，逗号分隔，顺序无关
// - 同一段内出现下一个已知 "key:" 时，值在该处截断
// - 两个键段之间、无数字无冒号的段视为前一个值的延续
// - 遇到第一个非键段即停止，之后为条目正文
// - office 按变动类型映射: 入库 -> from，出库/调整 -> to (显式 from/to 优先)
// ==========================================

use crate::domain::movement::GlobalParameters;
use crate::domain::types::MovementKind;
use regex::Regex;
use std::sync::OnceLock;

fn key_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(project|driver|from|to|office|note)\s*:\s*(.*)$")
            .expect("invalid key segment regex")
    })
}

fn inline_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(project|driver|from|to|office|note)\s*:").expect("invalid inline key regex")
    })
}

// ==========================================
// ParamKey - 可识别的参数键
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Project,
    Driver,
    From,
    To,
    Office,
    Note, // 仅条目级
}

impl ParamKey {
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "project" => Some(ParamKey::Project),
            "driver" => Some(ParamKey::Driver),
            "from" => Some(ParamKey::From),
            "to" => Some(ParamKey::To),
            "office" => Some(ParamKey::Office),
            "note" => Some(ParamKey::Note),
            _ => None,
        }
    }

    pub fn is_header_key(&self) -> bool {
        !matches!(self, ParamKey::Note)
    }
}

/// 解析 "key: value" 段
///
/// 值内出现的后续 "key:" 会被切成新的键值对，
/// 例如 "project: Bridge driver: Tom" => [(Project, "Bridge"), (Driver, "Tom")]
///
/// # 返回
/// - None: 不是键段
pub(crate) fn parse_key_segment(segment: &str) -> Option<Vec<(ParamKey, String)>> {
    let caps = key_segment_re().captures(segment)?;
    let mut current = ParamKey::from_word(caps.get(1)?.as_str())?;
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let mut pairs = Vec::new();
    let mut cursor = 0;
    for inner in inline_key_re().captures_iter(rest) {
        let (Some(whole), Some(word)) = (inner.get(0), inner.get(1)) else {
            continue;
        };
        let Some(next) = ParamKey::from_word(word.as_str()) else {
            continue;
        };
        pairs.push((current, rest[cursor..whole.start()].trim().to_string()));
        current = next;
        cursor = whole.end();
    }
    pairs.push((current, rest[cursor..].trim().to_string()));
    Some(pairs)
}

/// office 映射到 from/to（仅在对应字段未显式给出时）
pub(crate) fn apply_office(kind: MovementKind, office: Option<&str>, params: &mut GlobalParameters) {
    let Some(office) = office else {
        return;
    };
    match kind {
        MovementKind::Receipt => {
            if params.from_location.is_none() {
                params.from_location = Some(office.to_string());
            }
        }
        MovementKind::Issue | MovementKind::Adjustment => {
            if params.to_location.is_none() {
                params.to_location = Some(office.to_string());
            }
        }
    }
}

// ==========================================
// RawGlobals - 未按变动类型解析的表头参数
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGlobals {
    pub project: Option<String>,
    pub driver: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub office: Option<String>,
}

impl RawGlobals {
    fn slot(&mut self, key: ParamKey) -> Option<&mut Option<String>> {
        match key {
            ParamKey::Project => Some(&mut self.project),
            ParamKey::Driver => Some(&mut self.driver),
            ParamKey::From => Some(&mut self.from),
            ParamKey::To => Some(&mut self.to),
            ParamKey::Office => Some(&mut self.office),
            ParamKey::Note => None,
        }
    }

    /// 设置键值，空值视为未提供
    pub fn set(&mut self, key: ParamKey, value: &str) {
        let value = value.trim();
        if let Some(slot) = self.slot(key) {
            *slot = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        }
    }

    /// 续写前一个值 ("Yard 3" + "North gate" => "Yard 3, North gate")
    pub fn append(&mut self, key: ParamKey, extra: &str) {
        if let Some(slot) = self.slot(key) {
            *slot = match slot.take() {
                Some(existing) => Some(format!("{}, {}", existing, extra.trim())),
                None => Some(extra.trim().to_string()),
            };
        }
    }

    /// 叠加: `other` 中有值的字段覆盖当前值
    pub fn overlay(&self, other: &RawGlobals) -> RawGlobals {
        RawGlobals {
            project: other.project.clone().or_else(|| self.project.clone()),
            driver: other.driver.clone().or_else(|| self.driver.clone()),
            from: other.from.clone().or_else(|| self.from.clone()),
            to: other.to.clone().or_else(|| self.to.clone()),
            office: other.office.clone().or_else(|| self.office.clone()),
        }
    }

    /// 按变动类型解析为 GlobalParameters
    pub fn resolve(&self, kind: MovementKind) -> GlobalParameters {
        let mut params = GlobalParameters {
            project: self.project.clone(),
            driver: self.driver.clone(),
            from_location: self.from.clone(),
            to_location: self.to.clone(),
        };
        apply_office(kind, self.office.as_deref(), &mut params);
        params
    }

    pub fn is_empty(&self) -> bool {
        *self == RawGlobals::default()
    }
}

enum HeaderLine {
    Consumed,        // 整行都是表头
    Partial(String), // 行内表头之后即为正文
    Body,            // 整行都是正文
}

// ==========================================
// GlobalParameterExtractor - 表头参数提取器
// ==========================================
pub struct GlobalParameterExtractor;

impl GlobalParameterExtractor {
    /// 提取表头参数
    ///
    /// # 参数
    /// - text: 去掉指令前缀后的文本
    ///
    /// # 返回
    /// - (RawGlobals, 正文)
    pub fn extract(text: &str) -> (RawGlobals, String) {
        let mut globals = RawGlobals::default();
        let lines: Vec<&str> = text.lines().collect();

        let mut body_start = lines.len();
        let mut remainder: Option<String> = None;

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match Self::consume_header_line(line, &mut globals) {
                HeaderLine::Consumed => continue,
                HeaderLine::Partial(rest) => {
                    remainder = Some(rest);
                    body_start = idx + 1;
                    break;
                }
                HeaderLine::Body => {
                    body_start = idx;
                    break;
                }
            }
        }

        let mut body: Vec<String> = Vec::new();
        if let Some(rest) = remainder {
            body.push(rest);
        }
        body.extend(lines[body_start..].iter().map(|l| l.to_string()));

        (globals, body.join("\n"))
    }

    fn consume_header_line(line: &str, globals: &mut RawGlobals) -> HeaderLine {
        let segments: Vec<&str> = line.split(',').collect();
        let mut last_key: Option<ParamKey> = None;
        let mut consumed_any = false;
        let mut i = 0;

        while i < segments.len() {
            let segment = segments[i].trim();
            if segment.is_empty() {
                i += 1;
                continue;
            }

            // 分号结束表头: "project: Bridge; cement, 5"
            let (head, tail) = match segment.split_once(';') {
                Some((head, tail)) => (head, Some(tail)),
                None => (segment, None),
            };

            if let Some(pairs) = Self::header_pairs(head) {
                for (key, value) in pairs {
                    globals.set(key, &value);
                    last_key = Some(key);
                }
                consumed_any = true;

                if let Some(tail) = tail {
                    let mut rest = vec![tail];
                    rest.extend_from_slice(&segments[i + 1..]);
                    return HeaderLine::Partial(rest.join(",").trim().to_string());
                }
                i += 1;
                continue;
            }

            if let Some(key) = last_key {
                let is_continuation = tail.is_none()
                    && !segment.chars().any(|c| c.is_ascii_digit())
                    && !segment.contains(':')
                    && Self::next_is_header_key(&segments[i + 1..]);
                if is_continuation {
                    globals.append(key, segment);
                    i += 1;
                    continue;
                }
            }
            break;
        }

        if !consumed_any {
            HeaderLine::Body
        } else if i >= segments.len() {
            HeaderLine::Consumed
        } else {
            HeaderLine::Partial(segments[i..].join(",").trim().to_string())
        }
    }

    fn header_pairs(segment: &str) -> Option<Vec<(ParamKey, String)>> {
        parse_key_segment(segment).filter(|pairs| pairs.iter().all(|(k, _)| k.is_header_key()))
    }

    fn next_is_header_key(rest: &[&str]) -> bool {
        rest.iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(|s| Self::header_pairs(s).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_header() {
        let (g, body) =
            GlobalParameterExtractor::extract("project: Bridge Construction, cement, 50 bags");
        assert_eq!(g.project.as_deref(), Some("Bridge Construction"));
        assert_eq!(body, "cement, 50 bags");
    }

    #[test]
    fn test_keys_case_insensitive_and_order_independent() {
        let (g, body) = GlobalParameterExtractor::extract(
            "Driver: Tom, PROJECT: Site A, to: Warehouse 2\nsand, 10 tons",
        );
        assert_eq!(g.driver.as_deref(), Some("Tom"));
        assert_eq!(g.project.as_deref(), Some("Site A"));
        assert_eq!(g.to.as_deref(), Some("Warehouse 2"));
        assert_eq!(body, "sand, 10 tons");
    }

    #[test]
    fn test_value_cut_at_next_key() {
        let (g, _) = GlobalParameterExtractor::extract("project: Bridge driver: Tom\ncement, 5");
        assert_eq!(g.project.as_deref(), Some("Bridge"));
        assert_eq!(g.driver.as_deref(), Some("Tom"));
    }

    #[test]
    fn test_continuation_segment() {
        let (g, body) = GlobalParameterExtractor::extract(
            "from: Yard 3, North gate, driver: Tom, cement, 5",
        );
        assert_eq!(g.from.as_deref(), Some("Yard 3, North gate"));
        assert_eq!(g.driver.as_deref(), Some("Tom"));
        assert_eq!(body, "cement, 5");
    }

    #[test]
    fn test_semicolon_ends_header() {
        let (g, body) = GlobalParameterExtractor::extract("project: Bridge; cement, 5; sand, 3");
        assert_eq!(g.project.as_deref(), Some("Bridge"));
        assert_eq!(body, "cement, 5; sand, 3");
    }

    #[test]
    fn test_no_header() {
        let (g, body) = GlobalParameterExtractor::extract("cement, 50 bags\nsand, 3");
        assert!(g.is_empty());
        assert_eq!(body, "cement, 50 bags\nsand, 3");
    }

    #[test]
    fn test_office_mapping() {
        let raw = RawGlobals {
            office: Some("Main Office".to_string()),
            ..Default::default()
        };
        assert_eq!(
            raw.resolve(MovementKind::Receipt).from_location.as_deref(),
            Some("Main Office")
        );
        assert_eq!(
            raw.resolve(MovementKind::Issue).to_location.as_deref(),
            Some("Main Office")
        );

        let explicit = RawGlobals {
            office: Some("Main Office".to_string()),
            to: Some("Site B".to_string()),
            ..Default::default()
        };
        assert_eq!(
            explicit.resolve(MovementKind::Issue).to_location.as_deref(),
            Some("Site B")
        );
    }
}
