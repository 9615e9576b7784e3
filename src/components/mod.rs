pub mod layers;
pub mod drag;

pub use drag::{DragController, PointerTarget};
pub use layers::{LayerCommand, TextElement, TextLayers};
