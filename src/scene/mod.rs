//! Scene objects: transforms, the camera, lights and drawable entities

mod camera;
mod camera_controller;
mod entity;
mod light;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use entity::*;
pub use light::*;
pub use transform::*;
