pub mod claims;
pub mod password;
pub mod revocation;
pub mod session;
pub mod tokens;

pub use claims::Claims;
pub use revocation::{RevocationList, SqliteRevocationList};
pub use session::{IssuedToken, Session, SessionManager};
