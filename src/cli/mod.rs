pub mod app;
pub mod commands;
pub mod dispatch;
pub mod env;
pub mod filter;
pub mod output;
pub mod policy;
pub mod runtime;
pub mod simulate;
pub mod tier;

pub use app::run;
pub use output::OutputFormat;
