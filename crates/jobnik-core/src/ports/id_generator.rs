//! UidGenerator port - UID 生成の抽象化
//!
//! UID はキュー側で submit 時に一度だけ生成されます。
//! テスト容易性のために trait として抽象化しています。

use crate::domain::JobUid;
use crate::ports::Clock;
use ulid::Ulid;

/// UidGenerator は job UID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の submitter から使える）
pub trait UidGenerator: Send + Sync {
    fn generate(&self) -> JobUid;
}

/// ULID ベースの UID 生成器
///
/// Clock の現在時刻 + ランダム部分から ULID を組み立てます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> UidGenerator for UlidGenerator<C> {
    fn generate(&self) -> JobUid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        JobUid::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
