//! 行エディタ: raw モード、キー入力、編集セッション、表示更新。
//!
//! 端末は `libc`（`read(2)`, `write(2)`, `poll(2)`）で直接扱う。
//!
//! ## アーキテクチャ
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ LineEditor::read_line(prompt, source)                 │
//! │  ┌──────────┐  ┌──────────┐  ┌────────────────────┐  │
//! │  │ RawMode  │  │ read_key │  │ EditSession::step  │  │
//! │  │ (RAII)   │  │ (入力)   │  │ (状態遷移 + 出力)  │  │
//! │  └──────────┘  └──────────┘  └────────────────────┘  │
//! │       │              │              │     │           │
//! │  termios 操作    libc::read    complete  write_all    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## 編集セッション
//!
//! [`EditSession`] は `{バッファ, 連続 Tab 回数}` を持つ状態機械で、
//! [`EditSession::step`] が 1 キーごとに状態を更新し、端末に書くべきバイト列を
//! 呼び出し側のバッファに追記する。端末 I/O を一切行わないため、実端末なしで
//! テストできる。
//!
//! カーソル移動はない。挿入は常に末尾、削除は末尾の 1 文字のみ。

use std::io::Write;
use std::os::unix::io::RawFd;

use crate::complete::{self, Complete, Completion};
use crate::terminal::RawMode;

/// ベル文字。
const BELL: char = '\x07';

/// 末尾 1 文字の消去シーケンス（戻る → 空白で上書き → 戻る）。
const ERASE: &str = "\x08 \x08";

// ── Key 入力 ──────────────────────────────────────────────────────

/// raw モードで読み取ったキー入力。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// 通常の印字可能文字（ASCII + UTF-8）。
    Char(char),
    /// Enter キー（CR `\r` または LF `\n`）。
    Enter,
    /// Backspace（DEL `0x7f` または BS `0x08`）。
    Backspace,
    /// Tab（`0x09`）: 補完トリガー。
    Tab,
    /// Ctrl+C（`0x03`）: 現在の入力を破棄して新プロンプト。
    CtrlC,
    /// Ctrl+D（`0x04`）: 空バッファなら入力終了、それ以外は無視。
    CtrlD,
    /// 入力が閉じた、または読み取りに失敗した。
    Eof,
    /// 未対応のバイト列（矢印キー等のエスケープシーケンスを含む）。無視される。
    Unknown,
}

/// キー入力のバイト供給元。
pub trait KeyInput {
    /// 1 バイト読む。EOF またはエラーなら `None`。
    fn read_byte(&mut self) -> Option<u8>;
    /// `timeout_ms` 以内に次のバイトが読めるか。
    fn pending(&mut self, timeout_ms: i32) -> bool;
}

/// ファイルディスクリプタから直接読む入力。Rust の stdin バッファを経由しない。
pub struct FdInput {
    fd: RawFd,
}

impl FdInput {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl KeyInput for FdInput {
    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        loop {
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
            if n == 1 {
                return Some(buf[0]);
            }
            if n < 0 && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return None;
        }
    }

    fn pending(&mut self, timeout_ms: i32) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        unsafe { libc::poll(&mut pfd, 1, timeout_ms) > 0 }
    }
}

impl KeyInput for &[u8] {
    fn read_byte(&mut self) -> Option<u8> {
        let (&first, rest) = self.split_first()?;
        *self = rest;
        Some(first)
    }

    fn pending(&mut self, _timeout_ms: i32) -> bool {
        !self.is_empty()
    }
}

/// ESC (`\x1b`) 後のシーケンスを読み捨てる。
///
/// 50ms 以内に後続バイトがなければ ESC 単独とみなす。
/// `ESC [` / `ESC O` の後は終端バイト（`0x40`〜`0x7e`）まで消費する。
fn read_escape_seq<I: KeyInput + ?Sized>(input: &mut I) -> Key {
    if !input.pending(50) {
        return Key::Unknown;
    }
    match input.read_byte() {
        Some(b'[') | Some(b'O') => {}
        _ => return Key::Unknown,
    }
    while let Some(b) = input.read_byte() {
        if (0x40..=0x7e).contains(&b) {
            break;
        }
    }
    Key::Unknown
}

/// UTF-8 マルチバイト文字の残りのバイトを読み取り、`Key::Char` に変換する。
fn read_utf8<I: KeyInput + ?Sized>(input: &mut I, first: u8, expected_len: usize) -> Key {
    let mut buf = [0u8; 4];
    buf[0] = first;
    for slot in buf.iter_mut().take(expected_len).skip(1) {
        match input.read_byte() {
            Some(b) => *slot = b,
            None => return Key::Unknown,
        }
    }
    match std::str::from_utf8(&buf[..expected_len]) {
        Ok(s) => s.chars().next().map_or(Key::Unknown, Key::Char),
        Err(_) => Key::Unknown,
    }
}

/// 1 キー分のバイト列を読み取り、[`Key`] に変換する。
pub fn read_key<I: KeyInput + ?Sized>(input: &mut I) -> Key {
    let byte = match input.read_byte() {
        Some(b) => b,
        None => return Key::Eof,
    };

    match byte {
        b'\r' | b'\n' => Key::Enter,
        0x7f | 0x08 => Key::Backspace,
        0x09 => Key::Tab,
        0x1b => read_escape_seq(input),
        3 => Key::CtrlC,
        4 => Key::CtrlD,
        b if (32..127).contains(&b) => Key::Char(b as char),
        b if b & 0xE0 == 0xC0 => read_utf8(input, b, 2),
        b if b & 0xF0 == 0xE0 => read_utf8(input, b, 3),
        b if b & 0xF8 == 0xF0 => read_utf8(input, b, 4),
        _ => Key::Unknown,
    }
}

// ── EditSession ───────────────────────────────────────────────────

/// [`EditSession::step`] の結果。
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// 入力継続。
    Continue,
    /// Enter で確定した行。
    Line(String),
    /// 入力終了（空バッファでの Ctrl+D、または入力が閉じた）。
    Eof,
}

/// 1 行分の編集状態。行ごとに作り直す。
pub struct EditSession {
    prompt: String,
    buf: String,
    /// バッファに保持できる最大文字数。
    max_len: usize,
    /// 曖昧な補完に対する連続 Tab 回数。Tab 以外のキーで 0 に戻る。
    tab_count: usize,
}

impl EditSession {
    pub fn new(prompt: &str, max_len: usize) -> Self {
        Self {
            prompt: prompt.to_string(),
            buf: String::new(),
            max_len,
            tab_count: 0,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buf
    }

    pub fn tab_count(&self) -> usize {
        self.tab_count
    }

    /// 1 キーを処理する。端末に書くべき内容を `out` に追記する。
    pub fn step<C: Complete + ?Sized>(&mut self, key: Key, source: &C, out: &mut String) -> Step {
        if key != Key::Tab {
            self.tab_count = 0;
        }

        match key {
            Key::Char(ch) => self.insert_char(ch, out),
            Key::Backspace => self.delete_char_before(out),
            Key::Tab => self.do_complete(source, out),
            Key::Enter => {
                out.push('\n');
                return Step::Line(std::mem::take(&mut self.buf));
            }
            Key::CtrlC => {
                out.push_str("^C\n");
                self.buf.clear();
                self.refresh_line(out);
            }
            Key::CtrlD => {
                if self.buf.is_empty() {
                    out.push('\n');
                    return Step::Eof;
                }
            }
            Key::Eof => {
                // 改行なしで入力が閉じた場合、残りを最後の行として返す
                out.push('\n');
                if self.buf.is_empty() {
                    return Step::Eof;
                }
                return Step::Line(std::mem::take(&mut self.buf));
            }
            Key::Unknown => {}
        }
        Step::Continue
    }

    /// 末尾に 1 文字追加してエコーする。上限を超える文字は捨てる。
    fn insert_char(&mut self, ch: char, out: &mut String) {
        if self.buf.chars().count() < self.max_len {
            self.buf.push(ch);
            out.push(ch);
        }
    }

    /// 末尾の 1 文字を削除する。空バッファでは何もしない。
    fn delete_char_before(&mut self, out: &mut String) {
        if self.buf.pop().is_some() {
            out.push_str(ERASE);
        }
    }

    /// Tab 補完を実行し、最後にプロンプト行を再描画する。
    ///
    /// - 候補 0 件 → ベル。バッファも Tab 回数も変えない
    /// - 候補 1 件 → バッファを `候補 + 空白` に置換し、Tab 回数をリセット
    /// - 候補複数 → 1 回目はベル、連続 2 回目で候補一覧（2 空白区切り）を表示
    fn do_complete<C: Complete + ?Sized>(&mut self, source: &C, out: &mut String) {
        match complete::complete(&self.buf, source) {
            Ok(Completion::NoMatch) => out.push(BELL),
            Ok(Completion::Unique(name)) => {
                let replacement = format!("{} ", name);
                if replacement.chars().count() > self.max_len {
                    out.push(BELL);
                } else {
                    self.buf = replacement;
                    self.tab_count = 0;
                }
            }
            Ok(Completion::Ambiguous(candidates)) => {
                if self.tab_count == 0 {
                    out.push(BELL);
                    self.tab_count += 1;
                } else {
                    out.push('\n');
                    out.push_str(&candidates.join("  "));
                    out.push('\n');
                    self.tab_count = 0;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "completion lookup failed");
                out.push('\n');
                out.push_str(&format!("tish: {}", e));
                out.push('\n');
                out.push(BELL);
            }
        }
        self.refresh_line(out);
    }

    /// 行頭へ戻り、プロンプト + バッファを書き直して行末までクリアする。
    fn refresh_line(&self, out: &mut String) {
        out.push('\r');
        out.push_str(&self.prompt);
        out.push_str(&self.buf);
        out.push_str("\x1b[K");
    }
}

// ── LineEditor ────────────────────────────────────────────────────

/// 端末から 1 行ずつ読む行エディタ。
///
/// raw モードは [`LineEditor::read_line`] の間だけ有効で、コマンド実行中の
/// 子プロセスには元のモードの端末が渡る。
pub struct LineEditor {
    fd: RawFd,
    max_len: usize,
}

impl LineEditor {
    pub fn new(max_len: usize) -> Self {
        Self {
            fd: libc::STDIN_FILENO,
            max_len,
        }
    }

    /// プロンプトを表示し、1 行読み取る。
    /// Enter → `Some(line)`, 入力終了 → `None`。
    pub fn read_line<C: Complete + ?Sized>(&mut self, prompt: &str, source: &C) -> Option<String> {
        // ビルトインが std の stdout に書いた内容を先に出す
        let _ = std::io::stdout().flush();

        let mut session = EditSession::new(prompt, self.max_len);
        write_all(prompt);

        // 端末でなければ（パイプ入力等）そのままのモードで読む
        let _raw = match RawMode::enable(self.fd) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::debug!(error = %e, "reading without raw mode");
                None
            }
        };

        let mut input = FdInput::new(self.fd);
        let mut out = String::new();
        loop {
            let key = read_key(&mut input);
            out.clear();
            let step = session.step(key, source, &mut out);
            write_all(&out);
            match step {
                Step::Continue => continue,
                Step::Line(line) => return Some(line),
                Step::Eof => return None,
            }
        }
    }
}

/// libc::write で直接出力する（Rust の stdout バッファをバイパス）。
fn write_all(s: &str) {
    let bytes = s.as_bytes();
    let mut written = 0;
    while written < bytes.len() {
        let n = unsafe {
            libc::write(
                libc::STDOUT_FILENO,
                bytes[written..].as_ptr() as *const libc::c_void,
                bytes.len() - written,
            )
        };
        if n <= 0 {
            break;
        }
        written += n as usize;
    }
}

// ── Tests ─────────────────────────────────────────────────────────
