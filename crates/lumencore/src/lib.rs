//! # Lumencore — Physically-Based Offline Renderer Core
//!
//! A Monte Carlo path-tracing core: scene acceleration ([`bvh`]), triangle
//! meshes with bevel/fillet edge rounding ([`mesh`]), a texture evaluation
//! DAG ([`texture`]), materials and lights built on top of it ([`scene`]),
//! and the film/imaging pipeline that turns samples into pixels
//! ([`image`]). Samplers, the direct-lighting sampling cache, the path
//! integrator, and the render session state machine build on these.
//!
//! Entities never hold pointers to each other: a [`scene::Scene`] owns every
//! mesh, material, light, and object in an arena and hands out stable
//! indices, the fix for the original renderer's cyclic scene/mesh/texture
//! pointer graph (see the design notes' redesign flags).

pub mod bvh;
pub mod color;
pub mod distribution;
pub mod dlsc;
pub mod error;
pub mod film;
pub mod image;
pub mod integrator;
pub mod math;
pub mod mesh;
pub mod persist;
pub mod properties;
pub mod sampler;
pub mod scene;
pub mod session;
pub mod texture;
pub mod tile;

pub use error::{RenderError, Result};
