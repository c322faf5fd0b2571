//! SQL text helpers: normalization, read detection, table extraction and
//! cache-key hashing.
//!
//! Table extraction is lexical. It tokenizes the statement and walks the
//! keywords that introduce table references (`FROM`, `JOIN`, `INTO`,
//! `UPDATE`, `DELETE FROM`, `TRUNCATE`/`DROP`/`ALTER TABLE`). Errors lean
//! towards reporting too many tables: an extra name only costs a spurious
//! invalidation, a missing one would let a stale entry survive a write.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tiknix_core::Binding;

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        (?P<comment>/\*(?s:.*?)(?:\*/|\z) | --[^\n]* | \x23[^\n]*)
      | (?P<literal>'(?:[^']|'')*')
      | (?P<ident>
            (?:`[^`]*`|"[^"]*"|\[[^\]]*\]|[A-Za-z_][A-Za-z0-9_$]*)
            (?:\s*\.\s*(?:`[^`]*`|"[^"]*"|\[[^\]]*\]|[A-Za-z_][A-Za-z0-9_$]*))*
        )
      | (?P<number>[0-9]+(?:\.[0-9]+)?)
      | (?P<punct>\S)
        "#,
    )
    .expect("invalid SQL token regex")
});

static IDENT_PART_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"`[^`]*`|"[^"]*"|\[[^\]]*\]|[A-Za-z_][A-Za-z0-9_$]*"#)
        .expect("invalid SQL identifier regex")
});

static BARE_IDENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid identifier regex"));

/// Words that end a table reference and can never be a table or an alias.
const RESERVED: &[&str] = &[
    "all", "and", "as", "by", "case", "cross", "default", "delete", "else", "end", "except",
    "exists", "for", "from", "full", "group", "having", "if", "inner", "insert", "intersect",
    "into", "join", "key", "left", "limit", "natural", "not", "offset", "on", "or", "order",
    "outer", "partition", "replace", "returning", "right", "select", "set", "straight_join",
    "table", "then", "union", "update", "using", "value", "values", "when", "where", "window",
    "with",
];

/// Modifiers that may sit between a keyword and the table name.
const MODIFIERS: &[&str] = &[
    "delayed",
    "high_priority",
    "ignore",
    "lateral",
    "low_priority",
    "only",
    "quick",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Literal,
    Ident,
    Number,
    Punct,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}

impl<'a> Token<'a> {
    /// Lowercased word if this is an unquoted, undotted identifier.
    fn word(&self) -> Option<String> {
        (self.kind == TokenKind::Ident && BARE_IDENT_REGEX.is_match(self.text))
            .then(|| self.text.to_ascii_lowercase())
    }

    fn is_reserved(&self) -> bool {
        self.word()
            .is_some_and(|w| RESERVED.contains(&w.as_str()) || MODIFIERS.contains(&w.as_str()))
    }

    fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }
}

fn tokenize(sql: &str) -> Vec<Token<'_>> {
    TOKEN_REGEX
        .captures_iter(sql)
        .filter_map(|caps| {
            if caps.name("comment").is_some() {
                return None;
            }
            let (kind, m) = if let Some(m) = caps.name("literal") {
                (TokenKind::Literal, m)
            } else if let Some(m) = caps.name("ident") {
                (TokenKind::Ident, m)
            } else if let Some(m) = caps.name("number") {
                (TokenKind::Number, m)
            } else {
                (TokenKind::Punct, caps.name("punct")?)
            };
            Some(Token {
                kind,
                text: m.as_str(),
            })
        })
        .collect()
}

/// Lowercased bare table name from a possibly qualified, quoted identifier.
fn clean_table_name(ident: &str) -> Option<String> {
    let last = IDENT_PART_REGEX.find_iter(ident).last()?.as_str();
    let stripped = last.trim_matches(|c| matches!(c, '`' | '"' | '[' | ']')).trim();
    (!stripped.is_empty()).then(|| stripped.to_lowercase())
}

fn skip_modifiers(tokens: &[Token<'_>], mut idx: usize) -> usize {
    while tokens
        .get(idx)
        .and_then(Token::word)
        .is_some_and(|w| MODIFIERS.contains(&w.as_str()))
    {
        idx += 1;
    }
    idx
}

fn table_at(tokens: &[Token<'_>], idx: usize) -> Option<String> {
    let token = tokens.get(idx)?;
    if token.kind != TokenKind::Ident || token.is_reserved() {
        return None;
    }
    clean_table_name(token.text)
}

/// Read `t1 [AS] a1, t2 [AS] a2, ...` starting at `idx`.
fn collect_table_list(tokens: &[Token<'_>], mut idx: usize, tables: &mut BTreeSet<String>) {
    loop {
        idx = skip_modifiers(tokens, idx);
        let Some(name) = table_at(tokens, idx) else {
            return;
        };
        tables.insert(name);
        idx += 1;

        if tokens.get(idx).and_then(Token::word).as_deref() == Some("as") {
            idx += 2;
        } else if tokens
            .get(idx)
            .is_some_and(|t| t.kind == TokenKind::Ident && !t.is_reserved())
        {
            idx += 1;
        }

        if tokens.get(idx).is_some_and(|t| t.is_punct(",")) {
            idx += 1;
        } else {
            return;
        }
    }
}

/// Extract the set of table names a statement reads or writes.
///
/// Names are lowercased with schema qualifiers and identifier quoting
/// removed. Unparseable or table-less text yields an empty set.
///
/// ```
/// use tiknix_storage::sql::extract_tables;
///
/// let tables = extract_tables("SELECT a.* FROM orders a JOIN customers c ON a.cid = c.id");
/// assert!(tables.contains("orders") && tables.contains("customers"));
/// ```
pub fn extract_tables(sql: &str) -> BTreeSet<String> {
    let tokens = tokenize(sql);
    let mut tables = BTreeSet::new();

    for (i, token) in tokens.iter().enumerate() {
        let Some(word) = token.word() else {
            continue;
        };
        let previous = i
            .checked_sub(1)
            .and_then(|p| tokens.get(p))
            .and_then(Token::word);

        match word.as_str() {
            "from" => collect_table_list(&tokens, i + 1, &mut tables),
            "join" | "straight_join" | "into" => {
                if let Some(name) = table_at(&tokens, skip_modifiers(&tokens, i + 1)) {
                    tables.insert(name);
                }
            }
            "update" => {
                // `ON DUPLICATE KEY UPDATE col = ...` and `FOR UPDATE` name no table.
                if matches!(previous.as_deref(), Some("key") | Some("for")) {
                    continue;
                }
                collect_table_list(&tokens, i + 1, &mut tables);
            }
            "table" => {
                if matches!(
                    previous.as_deref(),
                    Some("truncate") | Some("drop") | Some("alter") | Some("create")
                ) {
                    let mut idx = i + 1;
                    while tokens
                        .get(idx)
                        .and_then(Token::word)
                        .is_some_and(|w| matches!(w.as_str(), "if" | "not" | "exists"))
                    {
                        idx += 1;
                    }
                    if let Some(name) = table_at(&tokens, idx) {
                        tables.insert(name);
                    }
                }
            }
            "truncate" => {
                if let Some(name) = table_at(&tokens, i + 1) {
                    tables.insert(name);
                }
            }
            _ => {}
        }
    }

    tables
}

/// Canonical form used for cache keys.
///
/// Lowercases and collapses whitespace runs outside quoted segments, trims
/// both ends, and keeps `'...'`, `"..."`, `` `...` `` and `[...]` verbatim so
/// `WHERE name = 'Bob'` and `WHERE name = 'bob'` stay distinct. SQLite reads
/// an unmatched `"Bob"` as a string, so double quotes get the same treatment.
pub fn normalize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut closing: Option<char> = None;
    let mut pending_space = false;

    for ch in sql.trim().chars() {
        if let Some(close) = closing {
            out.push(ch);
            if ch == close {
                closing = None;
            }
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        match ch {
            '\'' | '"' | '`' => {
                closing = Some(ch);
                out.push(ch);
            }
            '[' => {
                closing = Some(']');
                out.push(ch);
            }
            _ => out.extend(ch.to_lowercase()),
        }
    }

    out
}

/// True for statements that only read (`SELECT`, `SHOW`). Leading comments
/// and parentheses are skipped.
pub fn is_read_query(sql: &str) -> bool {
    tokenize(sql)
        .iter()
        .find(|t| !t.is_punct("("))
        .and_then(Token::word)
        .is_some_and(|w| w == "select" || w == "show")
}

/// True if `name` is a plain identifier safe to splice into SQL.
pub fn is_valid_identifier(name: &str) -> bool {
    BARE_IDENT_REGEX.is_match(name)
}

/// Stable hash of an accessor prefix, normalized SQL and bindings.
///
/// Bindings are length-prefixed and type-tagged, so `'1'` and `1` hash
/// differently.
pub fn query_hash(kind_prefix: &str, normalized_sql: &str, bindings: &[Binding]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind_prefix.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized_sql.as_bytes());
    hasher.update([0u8]);
    for binding in bindings {
        match binding {
            Binding::Null => hasher.update([0u8]),
            Binding::Integer(i) => {
                hasher.update([1u8]);
                hasher.update(i.to_le_bytes());
            }
            Binding::Real(f) => {
                hasher.update([2u8]);
                hasher.update(f.to_bits().to_le_bytes());
            }
            Binding::Text(s) => {
                hasher.update([3u8]);
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
        }
    }
    hex::encode(&hasher.finalize()[..16])
}
