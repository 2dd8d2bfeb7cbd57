//! tish ライブラリ: ベンチマーク・テスト用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`terminal`] | 端末モード制御（raw モードの RAII ガード） |
//! | [`editor`] | 行エディタ（キー入力、編集セッション、表示更新） |
//! | [`complete`] | Tab 補完（ビルトイン省略形、検索パスからの候補分類） |
//! | [`path`] | 検索パス（コマンド解決、補完用ビューの接頭辞列挙） |
//! | [`parser`] | トークナイザ（クォート、エスケープ） |
//! | [`executor`] | コマンド実行（リダイレクト抽出、ビルトイン判定、起動と待機） |
//! | [`spawn`] | `posix_spawn` ラッパー（stdout/stderr の付け替え） |
//! | [`builtins`] | ビルトイン（`cd`, `echo`, `exit`, `pwd`, `type`） |
//! | [`shell`] | シェルの状態と 1 行分の処理 |
//! | [`config`] | 設定値（プロンプト、行長上限、ログフィルタ） |

pub mod builtins;
pub mod complete;
pub mod config;
pub mod editor;
pub mod executor;
pub mod parser;
pub mod path;
pub mod shell;
pub mod spawn;
pub mod terminal;
