//! Map canvas engine for the fleet-monitoring dashboard.
//!
//! The engine is rendering-backend agnostic: every component talks to the
//! surface through [`surface::SurfaceHandle`], a guarded adapter that goes
//! inert after teardown. The eframe binary supplies the concrete egui
//! surface; tests use a recording mock.

pub mod compositor;
pub mod draw;
pub mod entities;
pub mod geo;
pub mod host;
pub mod input;
pub mod persist;
pub mod store;
pub mod surface;
pub mod tiles;

#[cfg(test)]
pub(crate) mod testutil;
