#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc
)]

pub mod app;
pub mod channels;
pub mod clients;
pub mod config;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod util;
