//! Prelude with commonly used imports.
pub use crate::time::Hertz;
pub use fugit::{ExtU32 as _, RateExtU32 as _};
