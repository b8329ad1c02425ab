mod resolver;
mod token;

pub use resolver::{Authorization, resolve};
pub use token::{TokenGenerator, TokenKind, lookup_key, parse_token};
