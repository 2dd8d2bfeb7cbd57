//! シェルの設定値。
//!
//! 設定ファイルは持たない。既定値は定数で、環境変数 `TISH_LOG` のみ
//! ログフィルタの上書きに使う。

/// プロンプト文字列。
pub const DEFAULT_PROMPT: &str = "$ ";

/// 入力行の最大文字数。超過分は黙って捨てる。
pub const DEFAULT_MAX_LINE_LEN: usize = 99;

/// ログフィルタの既定値（`EnvFilter` 構文）。
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// ログフィルタを上書きする環境変数名。
pub const LOG_ENV: &str = "TISH_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// 毎行の先頭に表示するプロンプト。
    pub prompt: String,
    /// 編集バッファに保持できる最大文字数。
    pub max_line_len: usize,
    /// `tracing-subscriber` の `EnvFilter` に渡すディレクティブ。
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// 既定値に環境変数の上書きを適用する。空の `TISH_LOG` は無視する。
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }
        config
    }
}
