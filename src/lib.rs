//! Headless renderer for a dot grid that deforms around a moving contact
//! point, with a directional grain halo layered on top.
//!
//! The pipeline per frame: [`motion`] moves the contact, [`snapshot`] clamps
//! the configuration, then every pixel runs [`field`] → [`dots`] →
//! [`grain`] → [`composite`] on either the CPU or the GPU ([`renderer`]).
//! [`session::Session`] drives that loop for a host.

pub mod color;
pub mod composite;
pub mod dots;
pub mod encoding;
pub mod error_codes;
pub mod field;
pub mod gpu;
pub mod grain;
pub mod manifest;
pub mod motion;
pub mod noise;
pub mod renderer;
pub mod schema;
pub mod session;
pub mod shape;
pub mod snapshot;
