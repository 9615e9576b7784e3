#[macro_use]
pub mod logger;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod coords;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod viewport;

pub use error::EditorError;
pub use project::Project;
pub use viewport::ViewportTransform;
