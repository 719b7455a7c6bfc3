//! Quarry Custom SQL Page
//!
//! Result views for user-submitted SQL, query templates for a chosen table
//! and a keyword-aware SQL formatter.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::{DownloadLink, TableView};
use crate::session::{HistoryEntry, HistoryStatus};
use chrono::NaiveDateTime;
use quarry_analytics::export::query_stem;
use quarry_analytics::ExportFormat;
use quarry_common::utils::format_size;
use quarry_db::identifier::quote_ident;
use quarry_db::QueryOutcome;
use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token as SqlToken, Tokenizer, TokenizerError, Whitespace};

const KEYWORDS: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "AVG", "BETWEEN", "BY", "CASE", "COUNT", "CROSS", "DELETE",
    "DESC", "DISTINCT", "ELSE", "END", "EXISTS", "FROM", "FULL", "GROUP", "HAVING", "IN",
    "INNER", "INSERT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "MAX", "MIN", "NOT",
    "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "RIGHT", "SELECT", "SET", "SUM", "THEN",
    "UNION", "UPDATE", "VALUES", "WHEN", "WHERE", "WITH",
];
const CLAUSES: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION",
];
const JOIN_PREFIXES: &[&str] = &["INNER", "LEFT", "RIGHT", "FULL", "CROSS"];
const FUNCTIONS: &[&str] = &["AVG", "COUNT", "MAX", "MIN", "SUM"];
const INDENT: &str = "\n  ";

// =============================================================================
// Result Views
// =============================================================================

/// What the page shows after a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResultView {
    pub status: HistoryStatus,
    pub message: String,
    pub result: Option<TableView>,
    pub row_count: Option<usize>,
    pub affected_rows: Option<u64>,
    pub memory: Option<String>,
    pub execution_time_ms: u64,
    pub downloads: Vec<DownloadLink>,
}

impl QueryResultView {
    pub fn new(outcome: &QueryOutcome, execution_time_ms: u64, executed_at: NaiveDateTime) -> Self {
        match outcome {
            QueryOutcome::Rows(rs) => {
                let message = if rs.is_empty() {
                    "Query executed successfully but returned no results.".to_string()
                } else {
                    format!("Query executed successfully! Found {} rows.", rs.len())
                };
                let downloads = if rs.is_empty() {
                    Vec::new()
                } else {
                    query_downloads(executed_at)
                };
                Self {
                    status: HistoryStatus::Success,
                    message,
                    result: Some(TableView::from(rs)),
                    row_count: Some(rs.len()),
                    affected_rows: None,
                    memory: Some(format_size(rs.approximate_size() as u64)),
                    execution_time_ms,
                    downloads,
                }
            }
            QueryOutcome::Affected(n) => Self {
                status: HistoryStatus::Success,
                message: format!("Statement executed, {} rows affected.", n),
                result: None,
                row_count: None,
                affected_rows: Some(*n),
                memory: None,
                execution_time_ms,
                downloads: Vec::new(),
            },
        }
    }
}

fn query_downloads(executed_at: NaiveDateTime) -> Vec<DownloadLink> {
    let stem = query_stem(executed_at);
    [
        (ExportFormat::Csv, "Download as CSV"),
        (ExportFormat::Xlsx, "Download as Excel"),
        (ExportFormat::Json, "Download as JSON"),
    ]
    .into_iter()
    .map(|(format, label)| DownloadLink {
        format,
        label: label.to_string(),
        filename: format!("{}.{}", stem, format.extension()),
    })
    .collect()
}

/// The session's query history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub count: usize,
    pub entries: Vec<HistoryEntry>,
}

impl HistoryView {
    pub fn new(entries: &[HistoryEntry]) -> Self {
        Self {
            count: entries.len(),
            entries: entries.to_vec(),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// A starting point for the query editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryTemplate {
    pub name: &'static str,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplatesPage {
    pub tables: Vec<String>,
    pub table: Option<String>,
    pub templates: Vec<QueryTemplate>,
    pub read_only: bool,
}

/// Lowercase identifiers are written bare, anything else quoted.
fn sql_name(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if simple {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

pub fn query_templates(table: &str) -> Vec<QueryTemplate> {
    let t = sql_name(table);
    vec![
        QueryTemplate {
            name: "Select All",
            sql: format!("SELECT * FROM {t} LIMIT 100;"),
        },
        QueryTemplate {
            name: "Count Records",
            sql: format!("SELECT COUNT(*) as total_records FROM {t};"),
        },
        QueryTemplate {
            name: "Group By",
            sql: format!(
                "SELECT column_name, COUNT(*) as count\nFROM {t}\nGROUP BY column_name\nORDER BY count DESC;"
            ),
        },
        QueryTemplate {
            name: "Filter",
            sql: format!("SELECT *\nFROM {t}\nWHERE column_name = 'value'\nLIMIT 100;"),
        },
        QueryTemplate {
            name: "Join",
            sql: format!(
                "SELECT t1.*, t2.column\nFROM {t} t1\nJOIN other_table t2 ON t1.id = t2.id\nLIMIT 100;"
            ),
        },
        QueryTemplate {
            name: "Aggregate Functions",
            sql: format!(
                "SELECT \n  COUNT(*) as count,\n  AVG(numeric_column) as average,\n  MAX(numeric_column) as maximum,\n  MIN(numeric_column) as minimum\nFROM {t};"
            ),
        },
        QueryTemplate {
            name: "Date Filter",
            sql: format!(
                "SELECT *\nFROM {t}\nWHERE date_column >= '2024-01-01'\n  AND date_column <= '2024-12-31'\nORDER BY date_column DESC;"
            ),
        },
    ]
}

// =============================================================================
// Formatting
// =============================================================================

/// Formatter view of a lexed token. Literal text is the token's own SQL
/// rendering and is never altered.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Literal(String),
    Op(String),
    Punct(char),
    LineComment(String),
}

impl Token {
    fn keyword(&self) -> Option<String> {
        match self {
            Token::Word(w) => {
                let upper = w.to_ascii_uppercase();
                KEYWORDS.contains(&upper.as_str()).then_some(upper)
            }
            _ => None,
        }
    }
}

/// Lex with the PostgreSQL dialect. Plain whitespace is dropped; comments,
/// quoted identifiers and string literals (including dollar-quoted bodies)
/// keep their source text.
fn tokenize(sql: &str) -> Result<Vec<Token>, TokenizerError> {
    let dialect = PostgreSqlDialect {};
    let lexed = Tokenizer::new(&dialect, sql).with_unescape(false).tokenize()?;

    Ok(lexed
        .into_iter()
        .filter_map(|token| match token {
            SqlToken::EOF => None,
            SqlToken::Whitespace(Whitespace::SingleLineComment { comment, prefix }) => {
                Some(Token::LineComment(format!("{}{}", prefix, comment.trim_end())))
            }
            SqlToken::Whitespace(Whitespace::MultiLineComment(text)) => {
                Some(Token::Literal(format!("/*{}*/", text)))
            }
            SqlToken::Whitespace(_) => None,
            SqlToken::Word(word) if word.quote_style.is_none() => Some(Token::Word(word.value)),
            SqlToken::Comma => Some(Token::Punct(',')),
            SqlToken::SemiColon => Some(Token::Punct(';')),
            SqlToken::LParen => Some(Token::Punct('(')),
            SqlToken::RParen => Some(Token::Punct(')')),
            SqlToken::Period => Some(Token::Punct('.')),
            SqlToken::DoubleColon => Some(Token::Op("::".to_string())),
            SqlToken::Word(_)
            | SqlToken::SingleQuotedString(_)
            | SqlToken::DoubleQuotedString(_)
            | SqlToken::DollarQuotedString(_)
            | SqlToken::NationalStringLiteral(_)
            | SqlToken::EscapedStringLiteral(_)
            | SqlToken::HexStringLiteral(_) => Some(Token::Literal(token.to_string())),
            other => Some(Token::Op(other.to_string())),
        })
        .collect())
}

fn needs_space(out: &str, prev: Option<&Token>, current: &Token) -> bool {
    if out.is_empty() || out.ends_with(' ') || out.ends_with('\n') {
        return false;
    }
    match (prev, current) {
        (Some(Token::Punct('(' | '.')), _) => false,
        (_, Token::Punct(',' | ')' | ';' | '.')) => false,
        (Some(Token::Op(op)), _) | (_, Token::Op(op)) if op == "::" => false,
        (Some(prev @ Token::Word(_)), Token::Punct('(')) => match prev.keyword() {
            Some(kw) => !FUNCTIONS.contains(&kw.as_str()),
            None => false,
        },
        _ => true,
    }
}

fn starts_clause(keyword: &str, prev: Option<&str>, next: Option<&str>) -> bool {
    if CLAUSES.contains(&keyword) {
        return true;
    }
    if keyword == "JOIN" {
        return !matches!(prev, Some(p) if JOIN_PREFIXES.contains(&p) || p == "OUTER");
    }
    JOIN_PREFIXES.contains(&keyword) && matches!(next, Some("JOIN" | "OUTER"))
}

/// Reflow SQL: keywords uppercased, one line per top-level clause, one
/// select-list item per line. Literals and comments are kept verbatim; text
/// that does not lex (e.g. an unterminated string) is returned trimmed.
pub fn format_sql(sql: &str) -> String {
    let tokens = match tokenize(sql) {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!("SQL left unformatted: {}", e);
            return sql.trim().to_string();
        }
    };
    let mut out = String::new();
    let mut depth = 0usize;
    let mut in_select = false;

    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        match token {
            Token::Word(word) => {
                let keyword = token.keyword();
                let prev_kw = prev.and_then(Token::keyword);
                let next_kw = tokens.get(i + 1).and_then(Token::keyword);
                let breaks = depth == 0
                    && keyword
                        .as_deref()
                        .map(|k| starts_clause(k, prev_kw.as_deref(), next_kw.as_deref()))
                        .unwrap_or(false);

                if breaks {
                    let trimmed = out.trim_end().len();
                    out.truncate(trimmed);
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    in_select = false;
                } else if needs_space(&out, prev, token) {
                    out.push(' ');
                }
                out.push_str(keyword.as_deref().unwrap_or(word));

                if depth == 0 && keyword.as_deref() == Some("SELECT") {
                    out.push_str(INDENT);
                    in_select = true;
                }
            }
            Token::Punct(',') if depth == 0 && in_select => out.push_str(&format!(",{}", INDENT)),
            Token::Punct(';') => {
                out.push(';');
                if i + 1 < tokens.len() {
                    out.push('\n');
                }
                in_select = false;
            }
            Token::Punct(c) => {
                if needs_space(&out, prev, token) {
                    out.push(' ');
                }
                out.push(*c);
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            Token::LineComment(text) => {
                if needs_space(&out, prev, token) {
                    out.push(' ');
                }
                out.push_str(text);
                out.push_str(if in_select && depth == 0 { INDENT } else { "\n" });
            }
            Token::Literal(text) | Token::Op(text) => {
                if needs_space(&out, prev, token) {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
    }

    out.trim_end().to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quarry_common::{Column, ResultSet, Value};

    #[test]
    fn test_format_select() {
        assert_eq!(
            format_sql("select id, name from users where status = 'Open, or not' order by id limit 10"),
            "SELECT\n  id,\n  name\nFROM users\nWHERE status = 'Open, or not'\nORDER BY id\nLIMIT 10"
        );
    }

    #[test]
    fn test_format_functions_and_joins() {
        assert_eq!(
            format_sql("select count(*) as n, a.kind from a left join b on a.id = b.a_id group by a.kind"),
            "SELECT\n  COUNT(*) AS n,\n  a.kind\nFROM a\nLEFT JOIN b ON a.id = b.a_id\nGROUP BY a.kind"
        );
    }

    #[test]
    fn test_format_keeps_subqueries_and_casts() {
        assert_eq!(
            format_sql("select x::int from t where id in (select id from u)"),
            "SELECT\n  x::int\nFROM t\nWHERE id IN (SELECT id FROM u)"
        );
    }

    #[test]
    fn test_format_keeps_comments_in_place() {
        assert_eq!(
            format_sql("select a, -- note\n b from t"),
            "SELECT\n  a,\n  -- note\n  b\nFROM t"
        );
        assert_eq!(
            format_sql("select a /* why */ from t -- trailing"),
            "SELECT\n  a /* why */\nFROM t -- trailing"
        );
    }

    #[test]
    fn test_format_keeps_string_literals() {
        assert_eq!(
            format_sql("select $$it's$$ from t"),
            "SELECT\n  $$it's$$\nFROM t"
        );
        assert_eq!(
            format_sql("select 'it''s', \"Mixed Case\" from t"),
            "SELECT\n  'it''s',\n  \"Mixed Case\"\nFROM t"
        );
    }

    #[test]
    fn test_format_unlexable_input_untouched() {
        assert_eq!(format_sql("  select 'open  "), "select 'open");
    }

    #[test]
    fn test_templates() {
        let templates = query_templates("orders");
        assert_eq!(templates.len(), 7);
        assert_eq!(templates[0].sql, "SELECT * FROM orders LIMIT 100;");
        assert_eq!(templates[1].name, "Count Records");

        let quoted = query_templates("Order Items");
        assert_eq!(quoted[0].sql, "SELECT * FROM \"Order Items\" LIMIT 100;");
    }

    #[test]
    fn test_result_view() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        let rs = ResultSet::new(vec![Column::new("n", "int4")], vec![vec![Value::Int(1)]]);
        let view = QueryResultView::new(&QueryOutcome::Rows(rs), 4, at);
        assert_eq!(view.row_count, Some(1));
        assert_eq!(view.downloads[2].filename, "query_20240102_030405.json");

        let empty = QueryResultView::new(&QueryOutcome::Rows(ResultSet::empty()), 1, at);
        assert!(empty.downloads.is_empty());
        assert!(empty.message.contains("no results"));

        let affected = QueryResultView::new(&QueryOutcome::Affected(3), 2, at);
        assert_eq!(affected.affected_rows, Some(3));
        assert!(affected.result.is_none());
    }
}
