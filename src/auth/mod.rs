pub mod refresh;
pub mod session;
pub mod token;
pub mod validation;

pub use refresh::RefreshCoordinator;
pub use session::{AuthSession, SessionSnapshot, SessionState};
pub use token::TokenPair;
pub use validation::Registration;
