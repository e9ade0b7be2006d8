//! Asset resolution and texture descriptors for bridging Spine exports
//! to a renderer.
//!
//! This crate is renderer-agnostic. It turns heterogeneous asset
//! references (bundled modules, `file:` paths, `blob:` handles, `data:`
//! URIs, remote URLs) into guaranteed-local files, and exposes the atlas
//! page metadata a renderer needs to configure samplers and blending.
//! Rendering integrations live in separate crates (e.g.
//! `spinebridge-wgpu`).

#![forbid(unsafe_code)]

mod asset;
mod atlas;
mod error;
mod resolver;
mod skeleton;

pub use asset::*;
pub use atlas::*;
pub use error::*;
pub use resolver::*;
pub use skeleton::*;
