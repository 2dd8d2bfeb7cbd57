//! Tab 補完: 編集バッファ全体をコマンド名の接頭辞とみなして候補を分類する。
//!
//! 候補の供給元は [`Complete`] トレイトで抽象化する。本番は [`SearchPath`] の
//! 補完用ビュー、テストは固定リスト。
//!
//! ## 分類（適用は [`editor`](crate::editor) 側）
//!
//! - 候補 0 件 → [`Completion::NoMatch`]（ベル）
//! - 候補 1 件 → [`Completion::Unique`]（バッファを `候補 + 空白` に置換）
//! - 候補複数 → [`Completion::Ambiguous`]（1 回目はベル、連続 2 回目で一覧表示）
//!
//! `ech` / `exi` / `typ` の 3 つはビルトインの省略形として固定で補完し、
//! 検索パスを見ない。

use crate::path::{ResolveError, SearchPath};

/// ビルトイン省略形の固定補完表: (バッファ全体, 補完後の名前)。
const FAST_PATHS: &[(&str, &str)] = &[("ech", "echo"), ("exi", "exit"), ("typ", "type")];

/// 補完候補の供給元。
pub trait Complete {
    /// `prefix` で始まる名前をソート・重複除去済みで返す。
    fn candidates(&self, prefix: &str) -> Result<Vec<String>, ResolveError>;
}

impl Complete for SearchPath {
    fn candidates(&self, prefix: &str) -> Result<Vec<String>, ResolveError> {
        self.enumerate_prefix(prefix)
    }
}

/// 補完の分類結果。
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    NoMatch,
    /// 唯一の候補（末尾の空白は含まない）。
    Unique(String),
    /// 2 件以上の候補（ソート済み）。
    Ambiguous(Vec<String>),
}

/// バッファ内容に対する補完を求める。
pub fn complete<C: Complete + ?Sized>(buf: &str, source: &C) -> Result<Completion, ResolveError> {
    if let Some(&(_, name)) = FAST_PATHS.iter().find(|(abbrev, _)| *abbrev == buf) {
        return Ok(Completion::Unique(name.to_string()));
    }

    let mut candidates = source.candidates(buf)?;
    Ok(match candidates.len() {
        0 => Completion::NoMatch,
        1 => Completion::Unique(candidates.remove(0)),
        _ => Completion::Ambiguous(candidates),
    })
}
