mod helpers;
mod middleware;
mod token;

pub use middleware::{ANONYMOUS, AuthError, Caller, RequireAdmin, RequireUser};
pub use token::{TokenGenerator, parse_token};
