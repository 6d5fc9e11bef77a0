#![deny(unused_must_use)]

pub mod background;
pub mod clustering;
pub mod error;
pub mod polar;
pub mod pose;
pub mod tracking;
pub mod transform;
pub mod world;

pub use nalgebra;
