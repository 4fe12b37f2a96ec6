mod handler;

pub use handler::healthz;
