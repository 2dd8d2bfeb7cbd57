//! シェルの実行状態と、1 行分の処理（トークン分割 → 実行）。
//!
//! エラーは 1 行の処理の中で完結させ、[`ShellError`] として REPL ループに返す。
//! ループを止めるのは [`ShellError::is_fatal`] が真のときだけ。

use thiserror::Error;

use crate::config::Config;
use crate::executor::{self, ExecError};
use crate::parser::{self, TokenizeError};
use crate::path::SearchPath;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl ShellError {
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Tokenize(_) => 2,
            Self::Exec(e) => e.exit_status(),
        }
    }

    /// プロセス生成自体が不可能で、シェルを続行できない。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Exec(e) if e.is_fatal())
    }

    /// ユーザに表示するメッセージ。`command not found` 以外は `tish: ` を前置する。
    pub fn message(&self) -> String {
        match self {
            Self::Exec(ExecError::CommandNotFound(_)) => self.to_string(),
            _ => format!("tish: {}", self),
        }
    }
}

/// シェルの実行状態。REPL ループ全体で共有される。
pub struct Shell {
    /// 直前のコマンドの終了ステータス。`exit` のデフォルト値とプロセスの終了コードに使う。
    pub last_status: i32,
    /// `exit` ビルトインで true にセットされ、REPL ループを終了させる。
    pub should_exit: bool,
    pub config: Config,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Self {
            last_status: 0,
            should_exit: false,
            config,
        }
    }

    /// 1 行を分解して実行する。空行は何もしない。
    ///
    /// 成否にかかわらず `last_status` を更新する。
    pub fn run_line(&mut self, line: &str, search_path: &SearchPath) -> Result<(), ShellError> {
        let result = parser::tokenize(line)
            .map_err(ShellError::from)
            .and_then(|argv| {
                if argv.is_empty() {
                    return Ok(self.last_status);
                }
                tracing::trace!(?argv, "dispatch");
                executor::execute(self, argv, search_path).map_err(ShellError::from)
            });

        match result {
            Ok(status) => {
                self.last_status = status;
                Ok(())
            }
            Err(e) => {
                self.last_status = e.exit_status();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell::new(Config::default())
    }

    #[test]
    fn exit_zero_stops_loop() {
        let mut sh = shell();
        sh.last_status = 3;
        sh.run_line("exit 0", &SearchPath::default()).unwrap();
        assert!(sh.should_exit);
        assert_eq!(sh.last_status, 0);
    }

    #[test]
    fn blank_line_keeps_status() {
        let mut sh = shell();
        sh.last_status = 7;
        sh.run_line("   ", &SearchPath::default()).unwrap();
        assert_eq!(sh.last_status, 7);
        assert!(!sh.should_exit);
    }

    #[test]
    fn unterminated_quote_is_reported_not_run() {
        let mut sh = shell();
        let err = sh.run_line("exit 'abc", &SearchPath::default()).unwrap_err();
        assert!(matches!(err, ShellError::Tokenize(_)));
        assert_eq!(err.message(), "tish: unexpected EOF while looking for matching `'`");
        assert_eq!(sh.last_status, 2);
        assert!(!sh.should_exit);
    }

    #[test]
    fn unknown_command_message() {
        let mut sh = shell();
        let err = sh.run_line("lsx -l", &SearchPath::default()).unwrap_err();
        assert_eq!(err.message(), "lsx: command not found");
        assert_eq!(sh.last_status, 127);
        assert!(!err.is_fatal());
    }

    #[test]
    fn external_command_status() {
        let mut sh = shell();
        sh.run_line("sh -c 'exit 9'", &SearchPath::parse("/usr/bin:/bin")).unwrap();
        assert_eq!(sh.last_status, 9);
    }

    #[test]
    fn redirect_failure_message_has_no_errno_suffix() {
        let mut sh = shell();
        let err = sh
            .run_line("echo hi > /definitely/not/here/out.txt", &SearchPath::default())
            .unwrap_err();
        assert_eq!(
            err.message(),
            "tish: /definitely/not/here/out.txt: No such file or directory",
        );
        assert_eq!(sh.last_status, 1);
    }
}
