pub mod cancel;
pub mod errors;
pub mod events;
pub mod progress;
pub mod request;
pub mod runs;
