mod api;
mod app;

pub use api::api_router;
pub use app::app_router;
