//! tish: 小さな対話シェル
//!
//! REPL ループ: プロンプト表示 → 行エディタで入力読み取り → トークン分割 → 実行 → ループ
//!
//! 検索パスは 1 周ごとに `$PATH` から読み直し、同じ値を補完と実行の両方に渡す。

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tish::config::Config;
use tish::editor::LineEditor;
use tish::path::SearchPath;
use tish::shell::Shell;

/// ログを stderr に出す。フィルタが不正なら既定値に戻す。
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(tish::config::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> anyhow::Result<i32> {
    let config = Config::from_env();
    init_logging(&config);

    let mut editor = LineEditor::new(config.max_line_len);
    let mut shell = Shell::new(config);

    loop {
        let search_path = SearchPath::from_env();
        if search_path.is_empty() {
            tracing::debug!("search path is empty; only builtins can run");
        } else {
            tracing::trace!(dirs = search_path.dirs().len(), "search path refreshed");
        }

        let line = match editor.read_line(&shell.config.prompt, &search_path) {
            Some(line) => line,
            // EOF (Ctrl+D / 入力終了)
            None => break,
        };

        if let Err(e) = shell.run_line(&line, &search_path) {
            if e.is_fatal() {
                return Err(e).context("cannot create processes");
            }
            eprintln!("{}", e.message());
        }

        if shell.should_exit {
            break;
        }
    }

    Ok(shell.last_status)
}

fn main() {
    match run() {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            eprintln!("tish: {:#}", e);
            std::process::exit(1);
        }
    }
}
