pub mod scene;
pub mod text;

pub use scene::{FormField, ParamFormView, Scene, SceneRenderer};
pub use text::RenderError;
