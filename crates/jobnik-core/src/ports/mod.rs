//! Ports - 差し替え可能な外部依存（時刻, UID 生成）

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{UidGenerator, UlidGenerator};
