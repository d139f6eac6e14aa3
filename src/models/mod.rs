pub mod file;
pub mod history;
pub mod payment;
pub mod upload;
pub mod user;

pub use file::*;
pub use history::*;
pub use payment::*;
pub use upload::*;
pub use user::*;
