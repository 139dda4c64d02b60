//! Textual CTE insertion.
//!
//! The statement is tokenized (not parsed) so comments, string literals and
//! quoted identifiers are never mistaken for keywords. Only a `WITH` that is
//! the first significant top-level token opens the statement's CTE list;
//! `WITH` inside parentheses or later in the statement is left alone.

use crate::error::{SqlError, SqlResult};
use kiln_core::InjectedCte;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

/// Render CTE definitions as `alias as (sql), ...`.
///
/// ```
/// use kiln_core::InjectedCte;
/// use kiln_sql::render_ctes;
///
/// let ctes = vec![InjectedCte {
///     id: "model.shop.b".into(),
///     alias: "__kiln__cte__b".into(),
///     sql: "select 1;".into(),
/// }];
/// assert_eq!(render_ctes(&ctes), "__kiln__cte__b as (select 1)");
/// ```
pub fn render_ctes(ctes: &[InjectedCte]) -> String {
    ctes.iter()
        .map(|cte| format!("{} as ({})", cte.alias, clean_sql(&cte.sql)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn clean_sql(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Insert `ctes` into `sql`.
///
/// If the statement opens with `WITH` (or `WITH RECURSIVE`), the new
/// definitions are placed first in its list. Otherwise a `with` clause is
/// synthesized in front of the first significant token.
pub fn inject_ctes_into_sql(sql: &str, ctes: &[InjectedCte]) -> SqlResult<String> {
    if ctes.is_empty() {
        return Ok(sql.to_string());
    }
    let rendered = render_ctes(ctes);
    let injected = match locate_statement_start(sql)? {
        StatementStart::With { after } => {
            format!("{} {},{}", &sql[..after], rendered, &sql[after..])
        }
        StatementStart::Other { at } => {
            format!("{}with {} {}", &sql[..at], rendered, &sql[at..])
        }
    };
    Ok(injected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementStart {
    /// Byte offset just past `WITH` / `WITH RECURSIVE`
    With { after: usize },
    /// Byte offset of the first significant token
    Other { at: usize },
}

fn locate_statement_start(sql: &str) -> SqlResult<StatementStart> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| SqlError::Tokenize {
            message: e.message.clone(),
            line: e.location.line,
            column: e.location.column,
        })?;

    let lines = LineIndex::new(sql);
    let mut significant = tokens.iter().filter(|t| !is_trivia(&t.token));

    let Some(first) = significant.next() else {
        return Ok(StatementStart::Other { at: 0 });
    };
    let at = lines.offset(first.span.start);
    if !is_keyword(first, Keyword::WITH) {
        return Ok(StatementStart::Other { at });
    }

    let mut after = at + word_len(first);
    if let Some(next) = significant.next() {
        if is_keyword(next, Keyword::RECURSIVE) {
            after = lines.offset(next.span.start) + word_len(next);
        }
    }
    Ok(StatementStart::With { after })
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_) | Token::EOF)
}

fn is_keyword(token: &TokenWithSpan, keyword: Keyword) -> bool {
    matches!(&token.token, Token::Word(w) if w.quote_style.is_none() && w.keyword == keyword)
}

fn word_len(token: &TokenWithSpan) -> usize {
    match &token.token {
        Token::Word(w) => w.value.len(),
        other => other.to_string().len(),
    }
}

/// Maps tokenizer locations (1-based line, 1-based char column) to byte
/// offsets.
struct LineIndex<'a> {
    sql: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(sql: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { sql, starts }
    }

    fn offset(&self, loc: Location) -> usize {
        let line = (loc.line.max(1) - 1) as usize;
        let Some(&start) = self.starts.get(line) else {
            return self.sql.len();
        };
        let column = (loc.column.max(1) - 1) as usize;
        self.sql[start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| start + i)
            .unwrap_or(self.sql.len())
    }
}

#[cfg(test)]
#[path = "inline_test.rs"]
mod tests;
