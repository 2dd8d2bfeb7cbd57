//! `posix_spawn()` の安全な Rust ラッパーと、子プロセスの待機。
//!
//! 解決済みのパスを直接起動する（`PATH` 検索は [`path`](crate::path) 側で済ませる）。
//! stdout / stderr の付け替えは子プロセス側のファイルアクションだけで行い、
//! 親の fd には触れない。
//!
//! ## 構成
//!
//! | 型 | 役割 |
//! |-----|------|
//! | [`FileActions`] | `posix_spawn_file_actions_t` の RAII ラッパー（fd 操作） |
//! | [`CStringVec`] | argv 用の NULL 終端ポインタ配列 |
//! | [`spawn`] | 上記を組み合わせて `posix_spawn` を呼ぶ公開関数 |
//! | [`wait`] | `waitpid` で終了を待ち、終了ステータスに変換する |

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use thiserror::Error;

// ── エラー型 ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SpawnError {
    /// `posix_spawn` が errno を返した。
    #[error("{command}: {}", os_error_message(.source))]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// パスまたは引数に NUL バイトが含まれている。
    #[error("{command}: argument contains a NUL byte")]
    NulByte { command: String },
    /// `waitpid` の失敗。
    #[error("waitpid: {}", os_error_message(.0))]
    Wait(#[source] io::Error),
}

impl SpawnError {
    /// エラーに対応する終了ステータスを返す。
    /// 127 = command not found, 126 = permission denied, 1 = その他。
    pub fn exit_status(&self) -> i32 {
        match self.errno() {
            Some(libc::ENOENT) => 127,
            Some(libc::EACCES) => 126,
            _ => 1,
        }
    }

    /// プロセス生成そのものが不可能な状態か（資源枯渇）。
    /// この場合シェルを続行しても意味がない。
    pub fn is_fatal(&self) -> bool {
        matches!(self.errno(), Some(libc::EAGAIN) | Some(libc::ENOMEM))
    }

    fn errno(&self) -> Option<i32> {
        match self {
            Self::Spawn { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// I/O エラーを strerror 相当の文言にする（末尾の ` (os error N)` を落とす）。
pub(crate) fn os_error_message(e: &io::Error) -> String {
    let text = e.to_string();
    match text.rfind(" (os error ") {
        Some(i) => text[..i].to_string(),
        None => text,
    }
}

// ── FileActions ───────────────────────────────────────────────────

/// `posix_spawn_file_actions_t` の RAII ラッパー。Drop で自動 destroy。
struct FileActions {
    inner: libc::posix_spawn_file_actions_t,
}

impl FileActions {
    fn new() -> Self {
        unsafe {
            let mut actions: libc::posix_spawn_file_actions_t = std::mem::zeroed();
            libc::posix_spawn_file_actions_init(&mut actions);
            Self { inner: actions }
        }
    }

    /// `fd` を `target` に複製し、元の `fd` を閉じる。
    fn redirect(&mut self, fd: RawFd, target: RawFd) {
        if fd == target {
            return;
        }
        unsafe {
            libc::posix_spawn_file_actions_adddup2(&mut self.inner, fd, target);
            libc::posix_spawn_file_actions_addclose(&mut self.inner, fd);
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t {
        &self.inner
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.inner);
        }
    }
}

// ── CStringVec ────────────────────────────────────────────────────

/// argv 用の CString ベクタ。NULL 終端のポインタ配列を構築する。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*mut libc::c_char>,
}

impl CStringVec {
    /// NUL を含む引数があれば `None`。
    fn from_args(args: &[String]) -> Option<Self> {
        let strings = args
            .iter()
            .map(|s| CString::new(s.as_bytes()).ok())
            .collect::<Option<Vec<CString>>>()?;
        let mut ptrs: Vec<*mut libc::c_char> = strings
            .iter()
            .map(|s| s.as_ptr() as *mut libc::c_char)
            .collect();
        ptrs.push(std::ptr::null_mut()); // NULL 終端
        Some(Self {
            _strings: strings,
            ptrs,
        })
    }

    fn as_ptr(&self) -> *const *mut libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── spawn / wait ──────────────────────────────────────────────────

/// `posix_spawn` で `program` を起動する。成功時は子 PID を返す。
///
/// - `args`: 子に渡す argv（`args[0]` はユーザが入力したコマンド名のまま）
/// - `stdout_fd`: stdout に接続する fd（`None` なら継承）
/// - `stderr_fd`: stderr に接続する fd（`None` なら継承）
pub fn spawn(
    program: &Path,
    args: &[String],
    stdout_fd: Option<RawFd>,
    stderr_fd: Option<RawFd>,
) -> Result<libc::pid_t, SpawnError> {
    let command = args
        .first()
        .cloned()
        .unwrap_or_else(|| program.display().to_string());
    let nul = || SpawnError::NulByte {
        command: command.clone(),
    };

    let c_program = CString::new(program.as_os_str().as_bytes()).map_err(|_| nul())?;
    let argv = CStringVec::from_args(args).ok_or_else(nul)?;

    let mut actions = FileActions::new();
    if let Some(fd) = stdout_fd {
        actions.redirect(fd, libc::STDOUT_FILENO);
    }
    if let Some(fd) = stderr_fd {
        actions.redirect(fd, libc::STDERR_FILENO);
    }

    // environ を継承
    extern "C" {
        static environ: *const *mut libc::c_char;
    }

    let mut pid: libc::pid_t = 0;
    let ret = unsafe {
        libc::posix_spawn(
            &mut pid,
            c_program.as_ptr(),
            actions.as_ptr(),
            std::ptr::null(),
            argv.as_ptr(),
            environ as *const *mut libc::c_char,
        )
    };

    if ret != 0 {
        return Err(SpawnError::Spawn {
            command,
            source: io::Error::from_raw_os_error(ret),
        });
    }

    tracing::debug!(pid, program = %program.display(), "spawned");
    Ok(pid)
}

/// 子プロセスの終了を待ち、終了ステータスを返す。
///
/// 通常終了なら終了コード、シグナルで終了したなら `128 + シグナル番号`。
pub fn wait(pid: libc::pid_t) -> Result<i32, SpawnError> {
    let mut raw_status: i32 = 0;
    loop {
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if ret == pid {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(SpawnError::Wait(err));
    }

    let status = if libc::WIFEXITED(raw_status) {
        libc::WEXITSTATUS(raw_status)
    } else if libc::WIFSIGNALED(raw_status) {
        128 + libc::WTERMSIG(raw_status)
    } else {
        1
    };
    tracing::debug!(pid, status, "child exited");
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn exit_code_is_returned() {
        let pid = spawn(Path::new("/bin/sh"), &sh("exit 3"), None, None).unwrap();
        assert_eq!(wait(pid).unwrap(), 3);
    }

    #[test]
    fn signal_maps_to_128_plus() {
        let pid = spawn(Path::new("/bin/sh"), &sh("kill -9 $$"), None, None).unwrap();
        assert_eq!(wait(pid).unwrap(), 128 + libc::SIGKILL);
    }

    #[test]
    fn missing_program_is_enoent() {
        let err = spawn(Path::new("/nonexistent/prog"), &["prog".to_string()], None, None)
            .unwrap_err();
        assert_eq!(err.exit_status(), 127);
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "prog: No such file or directory");
    }

    #[test]
    fn nul_in_argument_is_rejected() {
        let err = spawn(Path::new("/bin/sh"), &["sh".to_string(), "a\0b".to_string()], None, None)
            .unwrap_err();
        assert!(matches!(err, SpawnError::NulByte { .. }));
    }

    #[test]
    fn os_error_message_drops_errno_suffix() {
        let e = io::Error::from_raw_os_error(libc::ENOENT);
        assert_eq!(os_error_message(&e), "No such file or directory");
        let e = io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(os_error_message(&e), "Permission denied");
        let e = io::Error::new(io::ErrorKind::Other, "custom failure");
        assert_eq!(os_error_message(&e), "custom failure");
    }
}
