pub mod hashing;
pub mod indexing;
mod quiet_assert;

pub use quiet_assert::quiet_assert;
