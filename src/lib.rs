pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform {
    pub mod ffmpeg;
    pub mod panel;
}
pub mod processing {
    pub mod dither;
}
pub mod resolver;
pub mod store;
pub mod tasks {
    pub mod player;
}

pub use error::Error;
