pub mod chat;
pub mod core;
pub mod finance;
pub mod meetings;
pub mod permissions;

pub use self::chat::*;
pub use self::core::*;
pub use self::finance::*;
pub use self::meetings::*;
pub use self::permissions::*;
