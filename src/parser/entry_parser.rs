// ==========================================
// 出入库批量指令 - 单条目解析
// ==========================================
// 规则 ("最后一个数字是数量"):
// 1. 去掉行首变动类型前缀 (/in /out /adjust)，记录为条目级类型
// 2. 剥离末尾的 "key: value" 段作为条目级覆盖 (project/driver/from/to/office/note)
// 3. 有逗号: 数量段 = 最后一个含数字的段；物料名 = 其前所有段
//    无逗号: 物料名 = 最后一个数字之前的文本
// 4. 数量后紧跟可识别单位词则取该单位，否则为件 (piece)
// 5. 数量段之后的无数字文本作为备注
// 数字 token: 前面是行首/空白/左括号的独立数字，可带正负号
// ==========================================

use crate::domain::movement::{CandidateMovement, GlobalParameters};
use crate::domain::types::{MovementKind, Unit};
use crate::parser::category::CategoryClassifier;
use crate::parser::error::ParseError;
use crate::parser::format_detector::entry_kind_prefix_re;
use crate::parser::global_params::{apply_office, parse_key_segment, ParamKey};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

fn number_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s(])([-+]?\d+(?:\.\d+)?)").expect("invalid number token regex")
    })
}

/// 数字 token 在文本中的位置
#[derive(Debug, Clone, Copy)]
struct NumberToken {
    start: usize,
    end: usize,
}

fn number_tokens(text: &str) -> Vec<NumberToken> {
    number_token_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| NumberToken {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// 条目级覆盖字段
#[derive(Debug, Default)]
struct EntryOverrides {
    project: Option<String>,
    driver: Option<String>,
    from: Option<String>,
    to: Option<String>,
    office: Option<String>,
    note: Option<String>,
}

impl EntryOverrides {
    fn set(&mut self, key: ParamKey, value: String) {
        if value.is_empty() {
            return;
        }
        // 从后往前剥离，先出现的同名键保留最终值
        let slot = match key {
            ParamKey::Project => &mut self.project,
            ParamKey::Driver => &mut self.driver,
            ParamKey::From => &mut self.from,
            ParamKey::To => &mut self.to,
            ParamKey::Office => &mut self.office,
            ParamKey::Note => &mut self.note,
        };
        *slot = Some(value);
    }
}

/// 数量之后的尾部: 单位 + 备注
fn split_unit_and_note(trailing: &str) -> (Unit, Option<String>) {
    let trailing = trailing.trim();
    if trailing.is_empty() {
        return (Unit::default(), None);
    }
    let mut words = trailing.splitn(2, char::is_whitespace);
    let first = words.next().unwrap_or("");
    let rest = words.next().unwrap_or("").trim();

    match Unit::from_word(first) {
        Some(unit) => (unit, non_empty(rest)),
        None => (Unit::default(), non_empty(trailing)),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn join_notes(parts: Vec<String>) -> Option<String> {
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.trim().is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

// ==========================================
// EntryParser - 条目解析器
// ==========================================
pub struct EntryParser<'a> {
    classifier: &'a dyn CategoryClassifier,
}

impl<'a> EntryParser<'a> {
    pub fn new(classifier: &'a dyn CategoryClassifier) -> Self {
        Self { classifier }
    }

    /// 解析单个条目
    ///
    /// # 参数
    /// - text: 条目原文
    /// - line: 条目序号 (从1开始)
    /// - kind: 批次变动类型 (条目前缀可覆盖)
    /// - globals: 已解析的全局参数
    /// - section: 多批次分段编号
    ///
    /// # 返回
    /// - Ok(CandidateMovement)
    /// - Err(ParseError): 该行无法解析
    pub fn parse_entry(
        &self,
        text: &str,
        line: usize,
        kind: MovementKind,
        globals: &GlobalParameters,
        section: Option<&str>,
    ) -> Result<CandidateMovement, ParseError> {
        let raw_text = text.trim().to_string();

        // 1. 条目级类型前缀
        let (entry_kind, content) = match entry_kind_prefix_re().find(&raw_text) {
            Some(m) => {
                let token = raw_text[m.start()..m.end()]
                    .trim()
                    .trim_end_matches(':')
                    .trim();
                let entry_kind = MovementKind::from_command_token(token).unwrap_or(kind);
                (entry_kind, raw_text[m.end()..].trim())
            }
            None => (kind, raw_text.as_str()),
        };

        // 2. 剥离末尾键值段
        let mut segments: Vec<&str> = content
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let mut overrides = EntryOverrides::default();
        while let Some(last) = segments.last() {
            match parse_key_segment(last) {
                Some(pairs) => {
                    for (key, value) in pairs.into_iter().rev() {
                        overrides.set(key, value);
                    }
                    segments.pop();
                }
                None => break,
            }
        }

        // 3. 定位数量段
        let quantity_index = segments
            .iter()
            .rposition(|s| !number_tokens(s).is_empty())
            .ok_or_else(|| ParseError::MissingQuantity {
                text: raw_text.clone(),
            })?;

        let quantity_segment = segments[quantity_index];
        let tokens = number_tokens(quantity_segment);
        let token = *tokens.last().ok_or_else(|| ParseError::MissingQuantity {
            text: raw_text.clone(),
        })?;
        let quantity_text = &quantity_segment[token.start..token.end];
        let leading = quantity_segment[..token.start].trim();
        let trailing = &quantity_segment[token.end..];

        let item_name = if quantity_index == 0 {
            // 无逗号 (或数量在首段): 数量前的文本即物料名
            leading.to_string()
        } else {
            let mut name = segments[..quantity_index].join(", ");
            if !leading.is_empty() {
                name.push(' ');
                name.push_str(leading);
            }
            name
        };
        let item_name = item_name.split_whitespace().collect::<Vec<_>>().join(" ");

        let quantity = Decimal::from_str(quantity_text.trim_start_matches('+')).map_err(|_| {
            ParseError::InvalidQuantity {
                token: quantity_text.to_string(),
            }
        })?;

        if item_name.is_empty() {
            return Err(ParseError::MissingItemName {
                quantity: quantity_text.to_string(),
            });
        }

        // 4. 单位与备注
        let (unit, trailing_note) = split_unit_and_note(trailing);
        let mut note_parts: Vec<String> = trailing_note.into_iter().collect();
        note_parts.extend(segments[quantity_index + 1..].iter().map(|s| s.to_string()));
        if let Some(note) = overrides.note.take() {
            note_parts.push(note);
        }

        // 5. 字段覆盖: 条目级 > 全局
        let mut params = GlobalParameters {
            project: overrides.project.clone(),
            driver: overrides.driver.clone(),
            from_location: overrides.from.clone(),
            to_location: overrides.to.clone(),
        };
        apply_office(entry_kind, overrides.office.as_deref(), &mut params);
        let params = globals.overlay(&params);

        let category = self.classifier.classify(&item_name);

        Ok(CandidateMovement {
            line,
            section: section.map(|s| s.to_string()),
            raw_text,
            item_name,
            quantity,
            unit,
            category,
            movement_kind: entry_kind,
            project: params.project,
            driver: params.driver,
            from_location: params.from_location,
            to_location: params.to_location,
            note: join_notes(note_parts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::category::KeywordCategoryClassifier;

    fn parse(text: &str) -> Result<CandidateMovement, ParseError> {
        let classifier = KeywordCategoryClassifier::new();
        let parser = EntryParser::new(&classifier);
        parser.parse_entry(text, 1, MovementKind::Receipt, &GlobalParameters::default(), None)
    }

    #[test]
    fn test_last_number_is_quantity() {
        let m = parse("Steel beam 9m, 10").unwrap();
        assert_eq!(m.item_name, "Steel beam 9m");
        assert_eq!(m.quantity, Decimal::new(10, 0));
        assert_eq!(m.unit, Unit::Piece);
    }

    #[test]
    fn test_unit_after_quantity() {
        let m = parse("cement, 50 bags").unwrap();
        assert_eq!(m.item_name, "cement");
        assert_eq!(m.quantity, Decimal::new(50, 0));
        assert_eq!(m.unit, Unit::Bag);

        let m = parse("sand 2.5 tons").unwrap();
        assert_eq!(m.item_name, "sand");
        assert_eq!(m.quantity, Decimal::new(25, 1));
        assert_eq!(m.unit, Unit::Ton);
    }

    #[test]
    fn test_attached_unit() {
        let m = parse("binding wire, 20kg").unwrap();
        assert_eq!(m.quantity, Decimal::new(20, 0));
        assert_eq!(m.unit, Unit::Kilogram);
    }

    #[test]
    fn test_name_with_inner_comma() {
        let m = parse("Paint, white, 5 cans").unwrap();
        assert_eq!(m.item_name, "Paint, white");
        assert_eq!(m.unit, Unit::Can);
    }

    #[test]
    fn test_model_number_is_not_quantity() {
        let m = parse("floodlight FS-SFL800 4").unwrap();
        assert_eq!(m.item_name, "floodlight FS-SFL800");
        assert_eq!(m.quantity, Decimal::new(4, 0));
    }

    #[test]
    fn test_entry_overrides_and_note() {
        let globals = GlobalParameters {
            project: Some("Bridge".to_string()),
            to_location: Some("Site A".to_string()),
            ..Default::default()
        };
        let classifier = KeywordCategoryClassifier::new();
        let parser = EntryParser::new(&classifier);
        let m = parser
            .parse_entry(
                "cement, 50 bags urgent, to: Site B",
                3,
                MovementKind::Issue,
                &globals,
                Some("2"),
            )
            .unwrap();
        assert_eq!(m.project.as_deref(), Some("Bridge"));
        assert_eq!(m.to_location.as_deref(), Some("Site B"));
        assert_eq!(m.note.as_deref(), Some("urgent"));
        assert_eq!(m.section.as_deref(), Some("2"));
        assert_eq!(m.line, 3);
    }

    #[test]
    fn test_entry_kind_prefix() {
        let m = parse("/out sand, 3").unwrap();
        assert_eq!(m.movement_kind, MovementKind::Issue);
        assert_eq!(m.item_name, "sand");
    }

    #[test]
    fn test_negative_adjustment() {
        let classifier = KeywordCategoryClassifier::new();
        let parser = EntryParser::new(&classifier);
        let m = parser
            .parse_entry(
                "cement, -3 bags",
                1,
                MovementKind::Adjustment,
                &GlobalParameters::default(),
                None,
            )
            .unwrap();
        assert_eq!(m.quantity, Decimal::new(-3, 0));
        assert_eq!(m.signed_delta(), Decimal::new(-3, 0));
    }

    #[test]
    fn test_missing_quantity() {
        let err = parse("cement bags").unwrap_err();
        assert!(matches!(err, ParseError::MissingQuantity { .. }));
    }

    #[test]
    fn test_missing_item_name() {
        let err = parse("50 bags").unwrap_err();
        assert!(matches!(err, ParseError::MissingItemName { .. }));
    }
}
