//! トークナイザ: 1 行の入力を引数ベクタに分解する。
//!
//! 1 文字ずつ走査する状態機械。状態はクォート種別（なし / `'` / `"`）と、
//! 直前のバックスラッシュによる「エスケープ保留」フラグの組み合わせ。
//!
//! ## 規則
//!
//! | 文字 | クォート外 | `'...'` 内 | `"..."` 内 |
//! |------|-----------|-----------|-----------|
//! | 空白 | 区切り（保留中ならリテラル） | リテラル | リテラル |
//! | `'` | 開く（保留中ならリテラル） | 閉じる | リテラル |
//! | `"` | 開く（保留中ならリテラル） | リテラル | 閉じる（保留中ならリテラル） |
//! | `\` | 次の 1 文字をリテラルにする | リテラル | 次が `\` か `"` のときだけエスケープ |
//!
//! 連続する空白は 1 つの区切りとして扱い、空のトークンは作らない。
//! 行末でクォートが閉じていなければ [`TokenizeError::UnterminatedQuote`]。
//!
//! リダイレクト演算子（`>`, `2>>` 等）はここでは特別扱いせず、普通の引数として
//! 残す。解釈は [`executor`](crate::executor) 側で行う。

use std::borrow::Cow;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenizeError {
    /// クォートが閉じられていない。引数は開始クォート文字（`'` or `"`）。
    #[error("unexpected EOF while looking for matching `{0}`")]
    UnterminatedQuote(char),
}

/// 現在のクォート状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// 入力行を引数ベクタに分解する。空行・空白のみの行は空ベクタ。
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut escaped = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if escaped {
            // 保留中のエスケープ: 次の 1 文字はそのまま
            current.push(ch);
            escaped = false;
            continue;
        }

        match (quote, ch) {
            (Quote::None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            (Quote::None, '\'') => quote = Quote::Single,
            (Quote::None, '"') => quote = Quote::Double,
            (Quote::None, '\\') => escaped = true,
            (Quote::Single, '\'') => quote = Quote::None,
            (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, '\\') => {
                if matches!(chars.peek(), Some('\\') | Some('"')) {
                    escaped = true;
                } else {
                    current.push('\\');
                }
            }
            (_, c) => current.push(c),
        }
    }

    match quote {
        Quote::Single => return Err(TokenizeError::UnterminatedQuote('\'')),
        Quote::Double => return Err(TokenizeError::UnterminatedQuote('"')),
        Quote::None => {}
    }

    if !current.is_empty() {
        args.push(current);
    }
    Ok(args)
}

/// チルダ展開: `~` → `$HOME`, `~/path` → `$HOME/path`。
///
/// `$HOME` が未設定、または `~user` 形式なら展開しない。
pub fn expand_tilde(s: &str) -> Cow<'_, str> {
    let rest = match s.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return Cow::Borrowed(s),
    };
    match std::env::var("HOME") {
        Ok(home) => Cow::Owned(format!("{}{}", home, rest)),
        Err(_) => Cow::Borrowed(s),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
