//! 実行ファイルの検索: `$PATH` の値オブジェクトと、解決・補完候補列挙。
//!
//! [`SearchPath`] は `$PATH` を読み取った時点の不変な値で、REPL の 1 周ごとに
//! [`SearchPath::from_env`] で作り直して editor と executor に渡す。
//! 環境変数そのものは書き換えない。
//!
//! ## 2 つのビュー
//!
//! | 用途 | ビュー | 操作 |
//! |------|--------|------|
//! | コマンド解決 | 全ディレクトリ | [`SearchPath::resolve`] |
//! | Tab 補完 | [`COMPLETION_EXCLUDED_DIRS`] を除いたもの | [`SearchPath::enumerate_prefix`] |
//!
//! 補完側は標準のシステムディレクトリを走査しない。長い既定 `$PATH` で
//! 対話中に止まらないための制限で、システムのコマンドは補完されないが
//! 解決はされる。

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Tab 補完の走査から外すディレクトリ。
pub const COMPLETION_EXCLUDED_DIRS: &[&str] = &[
    "/usr/local/sbin",
    "/usr/sbin",
    "/usr/bin",
    "/sbin",
    "/bin",
    "/usr/local/bin",
];

#[derive(Debug, Error)]
pub enum ResolveError {
    /// 補完走査中にディレクトリを開けなかった。「候補なし」と区別するためエラーにする。
    #[error("{}: {source}", dir.display())]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 順序付きのディレクトリ列。先頭ほど優先。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// `$PATH` から構築する。未設定なら空。
    pub fn from_env() -> Self {
        match std::env::var("PATH") {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                tracing::debug!("PATH is not set; search path is empty");
                Self::default()
            }
        }
    }

    /// `:` 区切りの文字列を分解する。空の要素は捨てる。
    pub fn parse(value: &str) -> Self {
        Self {
            dirs: value
                .split(':')
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// 補完用ビュー。[`COMPLETION_EXCLUDED_DIRS`] に一致する要素を除いた複製を返す。
    pub fn filtered(&self) -> SearchPath {
        Self {
            dirs: self
                .dirs
                .iter()
                .filter(|d| !COMPLETION_EXCLUDED_DIRS.iter().any(|x| Path::new(x) == d.as_path()))
                .cloned()
                .collect(),
        }
    }

    /// コマンド名を実行ファイルのパスに解決する。最初に見つかったものを返す。
    ///
    /// `/` を含む名前は検索せず、そのパス自体を検査する。
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        if name.contains('/') {
            let path = Path::new(name);
            return is_executable(path).then(|| path.to_path_buf());
        }

        let hit = self
            .dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate));
        match &hit {
            Some(path) => tracing::debug!(name, path = %path.display(), "resolved"),
            None => tracing::debug!(name, "not found in search path"),
        }
        hit
    }

    /// 補完用ビューの全ディレクトリから、`prefix` で始まるエントリ名を集める。
    ///
    /// 比較はバイト単位・大文字小文字区別。重複を除いてソート済みで返す。
    /// 開けないディレクトリがあれば、その時点で呼び出し全体をエラーにする。
    pub fn enumerate_prefix(&self, prefix: &str) -> Result<Vec<String>, ResolveError> {
        let view = self.filtered();
        let mut names = Vec::new();

        for dir in view.dirs() {
            let entries = std::fs::read_dir(dir).map_err(|source| {
                tracing::warn!(dir = %dir.display(), error = %source, "cannot scan directory for completion");
                ResolveError::ReadDir {
                    dir: dir.clone(),
                    source,
                }
            })?;
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                let name = entry.file_name();
                if !name.as_bytes().starts_with(prefix.as_bytes()) {
                    continue;
                }
                match name.into_string() {
                    Ok(name) => names.push(name),
                    Err(raw) => {
                        tracing::debug!(dir = %dir.display(), name = ?raw, "skipping non-UTF-8 entry");
                    }
                }
            }
        }

        names.sort();
        names.dedup();
        tracing::trace!(prefix, count = names.len(), "completion candidates");
        Ok(names)
    }
}

/// 通常ファイルで、かつ `access(X_OK)` が通るか。
fn is_executable(path: &Path) -> bool {
    if !path.metadata().map_or(false, |m| m.is_file()) {
        return false;
    }
    match CString::new(path.as_os_str().as_bytes()) {
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 },
        Err(_) => false,
    }
}
