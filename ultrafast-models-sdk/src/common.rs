//! Small helpers shared across config and provider modules.

pub mod duration_serde {
    pub use crate::providers::duration_serde::*;
}
