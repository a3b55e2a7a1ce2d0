//! App - アプリケーション層
//!
//! queue と jobnik を組み合わせた consumer 側の実行ループ。

pub mod worker;

pub use self::worker::{Worker, WorkerHandle};
