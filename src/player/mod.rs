pub mod camera;
pub mod input;

pub use camera::Camera;
pub use input::InputState;
