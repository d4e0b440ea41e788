pub mod admin;
pub mod auth;
pub mod landing;
pub mod responses;
pub mod review;
pub mod router;
pub mod state;
pub mod submissions;
pub mod templates;

pub use state::AppState;
pub use templates::escape_html;
