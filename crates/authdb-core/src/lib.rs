pub mod error;
pub mod id;
pub mod serde_hex;
pub mod time;
pub mod user_agent;

pub use error::{CoreError, Result};
pub use id::{DeviceId, TokenId, Uid};
// `crate::` disambiguates the module from the external `time` crate.
pub use crate::time::{Timestamp, now_utc};
pub use user_agent::UserAgentInfo;
