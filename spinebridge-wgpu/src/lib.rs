//! wgpu integration for the `spinebridge` asset pipeline: the texture
//! adapter that turns resolved atlas pages into GPU textures, the
//! filter/wrap/blend translations onto wgpu's vocabulary, and a small
//! quad renderer used by the `viewer` example.

mod texture;
mod viewer;

pub use texture::*;
pub use viewer::*;
