use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// `[value]`
    Style,
    /// `<value>`
    Grid,
    /// `@value`
    CharacterMention,
}

impl TokenKind {
    fn pattern(self) -> &'static Regex {
        static STYLE: OnceLock<Regex> = OnceLock::new();
        static GRID: OnceLock<Regex> = OnceLock::new();
        static MENTION: OnceLock<Regex> = OnceLock::new();
        match self {
            TokenKind::Style => STYLE
                .get_or_init(|| Regex::new(r"\[([^\]]+)\]").expect("style token pattern")),
            TokenKind::Grid => {
                GRID.get_or_init(|| Regex::new(r"<([^>]+)>").expect("grid token pattern"))
            }
            TokenKind::CharacterMention => MENTION.get_or_init(|| {
                Regex::new(r"@([A-Za-z0-9_().:'\-]+)").expect("mention token pattern")
            }),
        }
    }

    pub fn wrap(self, value: &str) -> String {
        match self {
            TokenKind::Style => format!("[{value}]"),
            TokenKind::Grid => format!("<{value}>"),
            TokenKind::CharacterMention => format!("@{value}"),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Style => "style",
            TokenKind::Grid => "grid",
            TokenKind::CharacterMention => "mention",
        })
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "style" => Ok(TokenKind::Style),
            "grid" => Ok(TokenKind::Grid),
            "mention" | "character" | "character_mention" => Ok(TokenKind::CharacterMention),
            _ => Err(format!("Unknown token kind '{s}'; expected style, grid or mention.")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact substring as written, delimiters included.
    pub raw: String,
    /// Dictionary key with delimiters stripped.
    pub value: String,
    /// Byte range of `raw` in the scanned text.
    #[serde(skip)]
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScannedPrompt {
    pub style: Option<Token>,
    pub grid: Option<Token>,
    pub mentions: Vec<Token>,
}

impl ScannedPrompt {
    pub fn mention_ids(&self) -> Vec<&str> {
        self.mentions.iter().map(|token| token.value.as_str()).collect()
    }
}

/// Read-only scan. Only the first style and first grid span count.
pub fn scan(text: &str) -> ScannedPrompt {
    ScannedPrompt {
        style: first_token(text, TokenKind::Style),
        grid: first_token(text, TokenKind::Grid),
        mentions: all_tokens(text, TokenKind::CharacterMention),
    }
}

/// Every token of `kind`, in text order.
pub fn tokens_of(text: &str, kind: TokenKind) -> Vec<Token> {
    all_tokens(text, kind)
}

fn first_token(text: &str, kind: TokenKind) -> Option<Token> {
    kind.pattern()
        .captures(text)
        .and_then(|caps| token_from_captures(kind, &caps))
}

fn all_tokens(text: &str, kind: TokenKind) -> Vec<Token> {
    kind.pattern()
        .captures_iter(text)
        .filter_map(|caps| token_from_captures(kind, &caps))
        .collect()
}

fn token_from_captures(kind: TokenKind, caps: &regex::Captures<'_>) -> Option<Token> {
    let whole = caps.get(0)?;
    let inner = caps.get(1)?;
    Some(Token {
        kind,
        raw: whole.as_str().to_string(),
        value: inner.as_str().trim().to_string(),
        span: whole.range(),
    })
}

/// Removes every token of `kind` and tidies the separators left behind.
/// Text without such a token comes back untouched.
pub fn strip_tokens(text: &str, kind: TokenKind) -> String {
    let pattern = kind.pattern();
    if !pattern.is_match(text) {
        return text.to_string();
    }
    tidy_separators(&pattern.replace_all(text, ""))
}

/// Removes the first occurrence of `raw`, then tidies.
pub(crate) fn remove_span(text: &str, raw: &str) -> String {
    if raw.is_empty() || !text.contains(raw) {
        return text.to_string();
    }
    tidy_separators(&text.replacen(raw, "", 1))
}

pub(crate) fn tidy_separators(text: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static COMMAS: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern"));
    let commas = COMMAS.get_or_init(|| Regex::new(r"\s*,(?:\s*,)*").expect("comma run pattern"));

    let collapsed = spaces.replace_all(text, " ");
    let merged = commas.replace_all(&collapsed, ",");
    merged
        .trim_matches(|ch: char| ch == ',' || ch.is_whitespace())
        .to_string()
}

pub fn insert_style(text: &str, value: &str) -> String {
    insert_token(text, TokenKind::Style, value)
}

pub fn insert_grid(text: &str, value: &str) -> String {
    insert_token(text, TokenKind::Grid, value)
}

/// Keeps at most one token of `kind`: any existing one is dropped before appending.
fn insert_token(text: &str, kind: TokenKind, value: &str) -> String {
    let bare = value
        .trim()
        .trim_start_matches(['[', '<'])
        .trim_end_matches([']', '>'])
        .trim();
    let base = strip_tokens(text, kind);
    if bare.is_empty() {
        return base;
    }
    let token = kind.wrap(bare);
    let base = base.trim();
    if base.is_empty() {
        token
    } else {
        format!("{base} {token}")
    }
}
