pub mod allocator;
pub mod config;
pub mod docx;
pub mod error;
pub mod generate;
pub mod locale;
pub mod logging;
pub mod model;
pub mod sheet;
pub mod store;
pub mod templates;
