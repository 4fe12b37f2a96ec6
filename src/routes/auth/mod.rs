mod handler;

pub use handler::{TOKEN_HEADER, authenticate};
