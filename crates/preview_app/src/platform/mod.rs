mod app;
mod config;
mod fonts;
mod logging;

pub use app::run_app;
