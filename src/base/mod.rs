//! Base types and error handling.
//!
//! - [`NetError`]: error codes modelled on Chromium's `net_error_list.h`
//! - [`LoadState`]: coarse progress of one exchange

pub mod context;
pub mod loadstate;
pub mod neterror;

pub use loadstate::LoadState;
pub use neterror::NetError;
