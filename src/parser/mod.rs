// ==========================================
// 出入库批量指令 - 指令解析层
// ==========================================
// 职责: 自由文本指令 -> ParsedBatch
// 红线: 纯函数，不访问台账
// ==========================================

pub mod batch_parser;
pub mod category;
pub mod entry_parser;
pub mod error;
pub mod format_detector;
pub mod global_params;

pub use batch_parser::{split_command_prefix, BatchParser};
pub use category::{CategoryClassifier, KeywordCategoryClassifier};
pub use entry_parser::EntryParser;
pub use error::ParseError;
pub use format_detector::FormatDetector;
pub use global_params::{GlobalParameterExtractor, ParamKey, RawGlobals};
