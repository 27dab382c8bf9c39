pub mod youtube;

pub use youtube::{YouTubeClient, YouTubeConfig};
