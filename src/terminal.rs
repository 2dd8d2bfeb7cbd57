//! 端末モード制御: 行編集中だけ raw モードに切り替える RAII ガード。
//!
//! [`RawMode::enable`] で現在の termios を保存して raw モードを適用し、
//! ガードの Drop で保存した設定を復元する。正常復帰・早期 return・パニックの
//! いずれの経路でも復元される。
//!
//! raw モードは同時に 1 つしか有効にできない。プロセス全体のフラグで
//! 二重取得を検出し、[`TerminalError::AlreadyActive`] を返す。

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// raw モードのガードが生存中なら `true`。
static RAW_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum TerminalError {
    /// 別の [`RawMode`] がまだ生きている。
    #[error("raw mode is already active")]
    AlreadyActive,
    /// `tcgetattr` / `tcsetattr` の失敗。端末でない fd を渡した場合もここに来る。
    #[error("{call}: {source}")]
    Attr {
        call: &'static str,
        #[source]
        source: io::Error,
    },
}

/// raw モードの RAII ガード。Drop で元の termios を復元する。
///
/// | フラグ | 操作 | 理由 |
/// |--------|------|------|
/// | `c_iflag` | `ICRNL\|IXON` OFF | CR→LF 変換とフロー制御を無効化 |
/// | `c_oflag` | `OPOST` ON のまま | `\n` → `\r\n` 変換を維持 |
/// | `c_lflag` | `ECHO\|ICANON\|IEXTEN\|ISIG` OFF | エコー無効、1 バイトずつ読み取り、Ctrl+C/D をキーとして受信 |
/// | `VMIN`/`VTIME` | `1` / `0` | 最低 1 バイトで即座に返る |
pub struct RawMode {
    orig: libc::termios,
    fd: RawFd,
}

impl RawMode {
    pub fn enable(fd: RawFd) -> Result<Self, TerminalError> {
        if RAW_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TerminalError::AlreadyActive);
        }

        match apply_raw(fd) {
            Ok(orig) => {
                tracing::trace!(fd, "raw mode enabled");
                Ok(Self { orig, fd })
            }
            Err(e) => {
                RAW_ACTIVE.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// raw モードのガードが現在生存しているか。
    pub fn is_active() -> bool {
        RAW_ACTIVE.load(Ordering::Acquire)
    }
}

/// raw 設定を適用し、適用前の termios を返す。
fn apply_raw(fd: RawFd) -> Result<libc::termios, TerminalError> {
    let mut orig: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut orig) } != 0 {
        return Err(TerminalError::Attr {
            call: "tcgetattr",
            source: io::Error::last_os_error(),
        });
    }

    let mut raw = orig;
    raw.c_iflag &= !(libc::ICRNL | libc::IXON);
    raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
    raw.c_cc[libc::VMIN] = 1;
    raw.c_cc[libc::VTIME] = 0;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
        return Err(TerminalError::Attr {
            call: "tcsetattr",
            source: io::Error::last_os_error(),
        });
    }
    Ok(orig)
}

impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.orig);
        }
        RAW_ACTIVE.store(false, Ordering::Release);
        tracing::trace!(fd = self.fd, "raw mode restored");
    }
}
