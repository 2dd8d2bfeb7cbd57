//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずプロセス内で直接実行される。
//! `try_exec()` が `Some(status)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。
//!
//! 出力は呼び出し側が渡す `out` / `err` に書く。リダイレクト時はそれがファイルになる。

use std::env;
use std::io::{self, Write};
use std::path::Path;

use crate::parser;
use crate::path::SearchPath;
use crate::shell::Shell;
use crate::spawn;

/// ビルトイン一覧（アルファベット順）。`type` の判定にも使う。
pub const BUILTINS: &[&str] = &["cd", "echo", "exit", "pwd", "type"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `Some(status)`: ビルトインとして実行済み
/// - `None`: 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec(
    shell: &mut Shell,
    args: &[String],
    search_path: &SearchPath,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Option<i32> {
    let result = match args.first()?.as_str() {
        "exit" => builtin_exit(shell, args, err),
        "echo" => builtin_echo(args, out),
        "type" => builtin_type(args, search_path, out),
        "pwd" => builtin_pwd(out, err),
        "cd" => builtin_cd(args, err),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| {
        tracing::warn!(builtin = %args[0], error = %e, "builtin could not write its output");
        1
    }))
}

/// `exit [N]`: シェルを終了する。N が指定されればそのコードで、省略時は直前のステータスで終了。
fn builtin_exit(shell: &mut Shell, args: &[String], err: &mut dyn Write) -> io::Result<i32> {
    shell.should_exit = true;
    match args.get(1) {
        Some(code) => match code.parse::<i32>() {
            Ok(n) => Ok(n),
            Err(_) => {
                writeln!(err, "exit: {}: numeric argument required", code)?;
                Ok(2)
            }
        },
        None => Ok(shell.last_status),
    }
}

/// `echo args...`: 引数を空白 1 つで連結して出力する。
fn builtin_echo(args: &[String], out: &mut dyn Write) -> io::Result<i32> {
    writeln!(out, "{}", args[1..].join(" "))?;
    Ok(0)
}

/// `type name...`: ビルトインか、検索パス上のどこにあるかを表示する。
fn builtin_type(args: &[String], search_path: &SearchPath, out: &mut dyn Write) -> io::Result<i32> {
    let mut status = 0;
    for name in &args[1..] {
        if is_builtin(name) {
            writeln!(out, "{} is a shell builtin", name)?;
        } else if let Some(path) = search_path.resolve(name) {
            writeln!(out, "{} is {}", name, path.display())?;
        } else {
            writeln!(out, "{}: not found", name)?;
            status = 1;
        }
    }
    Ok(status)
}

/// `pwd`: カレントディレクトリを出力する。
fn builtin_pwd(out: &mut dyn Write, err: &mut dyn Write) -> io::Result<i32> {
    match env::current_dir() {
        Ok(dir) => {
            writeln!(out, "{}", dir.display())?;
            Ok(0)
        }
        Err(e) => {
            writeln!(err, "pwd: {}", e)?;
            Ok(1)
        }
    }
}

/// `cd [dir]`: カレントディレクトリを変更する。引数省略時と `~` は `$HOME` に移動。
fn builtin_cd(args: &[String], err: &mut dyn Write) -> io::Result<i32> {
    let target = match args.get(1).map(String::as_str) {
        None | Some("~") => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                writeln!(err, "cd: HOME not set")?;
                return Ok(1);
            }
        },
        Some(dir) => parser::expand_tilde(dir).into_owned(),
    };

    if let Err(e) = env::set_current_dir(Path::new(&target)) {
        let shown = args.get(1).map_or(target.as_str(), String::as_str);
        writeln!(err, "cd: {}: {}", shown, spawn::os_error_message(&e))?;
        return Ok(1);
    }
    tracing::debug!(dir = %target, "changed directory");
    Ok(0)
}
