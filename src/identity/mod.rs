//! Session tokens: signed, time-limited assertions binding a login to an expiry.
//! Keep the public surface thin and split implementation across sub-modules.

mod claims;
mod token;

pub use claims::{Claims, IssuedToken};
pub use token::{TokenError, TokenService};
