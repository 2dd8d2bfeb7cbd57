//! コマンド実行: リダイレクト抽出、ビルトイン判定、外部コマンドの起動と待機。
//!
//! - [`take_redirect`]: 引数ベクタからリダイレクト演算子とファイル名を取り除く
//! - ビルトイン: fork なしでプロセス内実行。出力先だけリダイレクトファイルに差し替える
//! - 外部コマンド: 検索パスで解決し、`posix_spawn` で起動して終了まで待つ
//!
//! リダイレクトは 1 コマンドにつき 1 つだけ。複数書かれていても、
//! [`REDIRECT_OPERATORS`] の順で最初に見つかったものだけを使う。

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use thiserror::Error;

use crate::builtins;
use crate::path::SearchPath;
use crate::shell::Shell;
use crate::spawn::{self, SpawnError};

/// 付け替え対象のストリーム。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// ファイルの開き方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// 作成 or 切り詰め
    Truncate,
    /// 作成 or 追記
    Append,
}

/// 演算子の走査順。上から順に探し、最初に見つかったものを採用する。
pub const REDIRECT_OPERATORS: &[(&str, Stream, RedirectMode)] = &[
    ("1>", Stream::Stdout, RedirectMode::Truncate),
    (">", Stream::Stdout, RedirectMode::Truncate),
    ("2>", Stream::Stderr, RedirectMode::Truncate),
    (">>", Stream::Stdout, RedirectMode::Append),
    ("1>>", Stream::Stdout, RedirectMode::Append),
    ("2>>", Stream::Stderr, RedirectMode::Append),
];

/// ファイルリダイレクト指定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub stream: Stream,
    pub mode: RedirectMode,
    pub target: String,
}

impl Redirect {
    /// ターゲットファイルをモード 0644 で開く。
    pub fn open(&self) -> Result<File, ExecError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(0o644);
        match self.mode {
            RedirectMode::Truncate => options.truncate(true),
            RedirectMode::Append => options.append(true),
        };
        let file = options.open(&self.target).map_err(|source| ExecError::Redirect {
            target: self.target.clone(),
            source,
        })?;
        tracing::debug!(target_file = %self.target, stream = ?self.stream, mode = ?self.mode, "redirect opened");
        Ok(file)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}: command not found")]
    CommandNotFound(String),
    /// リダイレクト演算子が行末にあり、ファイル名がない。
    #[error("syntax error: missing redirect target after `{0}`")]
    MissingRedirectTarget(String),
    /// リダイレクト先を開けなかった。
    #[error("{target}: {}", spawn::os_error_message(.source))]
    Redirect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

impl ExecError {
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::CommandNotFound(_) => 127,
            Self::MissingRedirectTarget(_) => 2,
            Self::Redirect { .. } => 1,
            Self::Spawn(e) => e.exit_status(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn(e) if e.is_fatal())
    }
}

/// 引数ベクタからリダイレクトを 1 つ取り出す。演算子とファイル名の 2 要素を取り除く。
pub fn take_redirect(argv: &mut Vec<String>) -> Result<Option<Redirect>, ExecError> {
    for &(op, stream, mode) in REDIRECT_OPERATORS {
        let Some(i) = argv.iter().position(|a| a == op) else {
            continue;
        };
        if i + 1 >= argv.len() {
            return Err(ExecError::MissingRedirectTarget(op.to_string()));
        }
        let target = argv.remove(i + 1);
        argv.remove(i);
        return Ok(Some(Redirect {
            stream,
            mode,
            target,
        }));
    }
    Ok(None)
}

/// 引数ベクタを実行し、終了ステータスを返す。
///
/// 処理順: リダイレクト抽出 → ファイルを開く → ビルトイン or 解決 → spawn → 待機。
/// ファイルはコマンドが見つからなくても作成される。
pub fn execute(shell: &mut Shell, mut argv: Vec<String>, search_path: &SearchPath) -> Result<i32, ExecError> {
    let redirect = take_redirect(&mut argv)?;
    let target = match &redirect {
        Some(r) => Some((r.stream, r.open()?)),
        None => None,
    };

    if argv.is_empty() {
        // `> file` 単独: ファイルを作るだけ
        return Ok(0);
    }

    if builtins::is_builtin(&argv[0]) {
        return Ok(execute_builtin(shell, &argv, search_path, target));
    }

    let program = search_path
        .resolve(&argv[0])
        .ok_or_else(|| ExecError::CommandNotFound(argv[0].clone()))?;

    let (stdout_fd, stderr_fd) = match &target {
        Some((Stream::Stdout, file)) => (Some(file.as_raw_fd()), None),
        Some((Stream::Stderr, file)) => (None, Some(file.as_raw_fd())),
        None => (None, None),
    };

    // ビルトインが書いた内容と順序が入れ替わらないように
    let _ = io::stdout().flush();

    let pid = spawn::spawn(&program, &argv, stdout_fd, stderr_fd)?;
    let status = spawn::wait(pid)?;
    Ok(status)
}

/// ビルトインをプロセス内で実行する。リダイレクトがあれば該当ストリームをファイルに差し替える。
fn execute_builtin(
    shell: &mut Shell,
    argv: &[String],
    search_path: &SearchPath,
    target: Option<(Stream, File)>,
) -> i32 {
    let stdout = io::stdout();
    let stderr = io::stderr();
    let status = match target {
        Some((Stream::Stdout, mut file)) => {
            builtins::try_exec(shell, argv, search_path, &mut file, &mut stderr.lock())
        }
        Some((Stream::Stderr, mut file)) => {
            builtins::try_exec(shell, argv, search_path, &mut stdout.lock(), &mut file)
        }
        None => builtins::try_exec(shell, argv, search_path, &mut stdout.lock(), &mut stderr.lock()),
    };
    status.unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::tokenize;
    use std::fs;

    fn argv(line: &str) -> Vec<String> {
        tokenize(line).unwrap()
    }

    fn system_path() -> SearchPath {
        SearchPath::parse("/usr/bin:/bin")
    }

    fn run(line: &str, search_path: &SearchPath) -> Result<i32, ExecError> {
        let mut shell = Shell::new(Config::default());
        execute(&mut shell, argv(line), search_path)
    }

    // ── take_redirect ──

    #[test]
    fn no_redirect() {
        let mut a = argv("ls -l");
        assert_eq!(take_redirect(&mut a).unwrap(), None);
        assert_eq!(a, vec!["ls", "-l"]);
    }

    #[test]
    fn each_operator() {
        let cases = [
            (">", Stream::Stdout, RedirectMode::Truncate),
            ("1>", Stream::Stdout, RedirectMode::Truncate),
            ("2>", Stream::Stderr, RedirectMode::Truncate),
            (">>", Stream::Stdout, RedirectMode::Append),
            ("1>>", Stream::Stdout, RedirectMode::Append),
            ("2>>", Stream::Stderr, RedirectMode::Append),
        ];
        for (op, stream, mode) in cases {
            let mut a = argv(&format!("cmd x {} out.txt", op));
            let r = take_redirect(&mut a).unwrap().unwrap();
            assert_eq!(r, Redirect { stream, mode, target: "out.txt".into() }, "{op}");
            assert_eq!(a, vec!["cmd", "x"], "{op}");
        }
    }

    #[test]
    fn only_first_operator_in_scan_order_is_taken() {
        let mut a = argv("cmd 2> err.txt > out.txt");
        let r = take_redirect(&mut a).unwrap().unwrap();
        assert_eq!(r.stream, Stream::Stdout);
        assert_eq!(r.target, "out.txt");
        assert_eq!(a, vec!["cmd", "2>", "err.txt"]);
    }

    #[test]
    fn arguments_after_target_are_kept() {
        let mut a = argv("cmd > out.txt tail");
        take_redirect(&mut a).unwrap();
        assert_eq!(a, vec!["cmd", "tail"]);
    }

    #[test]
    fn missing_target() {
        let mut a = argv("cmd >");
        assert!(matches!(
            take_redirect(&mut a),
            Err(ExecError::MissingRedirectTarget(op)) if op == ">"
        ));
    }

    // ── execute ──

    #[test]
    fn stdout_truncate_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "old contents\n").unwrap();

        let line = format!("sh -c 'echo first' > {}", out.display());
        assert_eq!(run(&line, &system_path()).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "first\n");

        let line = format!("sh -c 'echo second' >> {}", out.display());
        run(&line, &system_path()).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn stderr_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");

        let line = format!("sh -c 'echo oops >&2; exit 4' 2> {}", err.display());
        assert_eq!(run(&line, &system_path()).unwrap(), 4);
        assert_eq!(fs::read_to_string(&err).unwrap(), "oops\n");

        let line = format!("sh -c 'echo again >&2' 2>> {}", err.display());
        run(&line, &system_path()).unwrap();
        assert_eq!(fs::read_to_string(&err).unwrap(), "oops\nagain\n");
    }

    #[test]
    fn child_argv_has_no_redirect_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args.txt");

        let line = format!("sh -c 'echo $# \"$@\"' zero a > {} b", out.display());
        run(&line, &system_path()).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "2 a b\n");
    }

    #[test]
    fn builtin_output_is_redirected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("echo.txt");

        let line = format!("echo 'hello  world' 1> {}", out.display());
        assert_eq!(run(&line, &SearchPath::default()).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello  world\n");
    }

    #[test]
    fn builtin_stderr_is_redirected() {
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("cd.txt");

        let line = format!("cd /definitely/not/here 2> {}", err.display());
        assert_eq!(run(&line, &SearchPath::default()).unwrap(), 1);
        assert_eq!(
            fs::read_to_string(&err).unwrap(),
            "cd: /definitely/not/here: No such file or directory\n",
        );
    }

    #[test]
    fn command_not_found() {
        let err = run("nonexistent_cmd_xyz arg", &SearchPath::default()).unwrap_err();
        assert_eq!(err.to_string(), "nonexistent_cmd_xyz: command not found");
        assert_eq!(err.exit_status(), 127);
        assert!(!err.is_fatal());
    }

    #[test]
    fn redirect_file_created_even_if_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("created.txt");

        let line = format!("nonexistent_cmd_xyz > {}", out.display());
        assert!(run(&line, &SearchPath::default()).is_err());
        assert!(out.exists());
    }

    #[test]
    fn redirect_open_failure() {
        let line = "sh -c true > /definitely/not/here/out.txt";
        let err = run(line, &system_path()).unwrap_err();
        assert!(matches!(err, ExecError::Redirect { .. }));
        assert_eq!(err.to_string(), "/definitely/not/here/out.txt: No such file or directory");
    }

    #[test]
    fn redirect_only_line_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.txt");
        fs::write(&out, "stale").unwrap();

        assert_eq!(run(&format!("> {}", out.display()), &SearchPath::default()).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }
}
