mod claims;
mod token;

pub use claims::QueueClaims;
pub use token::TokenProvider;
