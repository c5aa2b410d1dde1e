pub mod collab_status;
pub mod diagnostics;
pub mod grader_lock;
pub mod health;
pub mod notify;

pub use collab_status::*;
pub use diagnostics::*;
pub use grader_lock::*;
pub use health::*;
pub use notify::*;
