pub mod render;
pub mod site;
pub mod transport;

pub use render::{RenderBackend, RenderJob, Renderer};
pub use site::Site;
pub use transport::Fetch;
