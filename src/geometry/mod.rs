//! Homogeneous 2D and 3D transform algebra.
//!
//! Everything is a plain matrix under the hood: [`Transform2`] wraps a 3x3 and
//! [`Transform3`] a 4x4 homogeneous matrix, composed by left multiplication.

pub mod transform;

pub use transform::{
    axis_rotation, euler_rotation, Axis, Reflection2, Reflection3, Transform2, Transform3,
    SINGULAR_EPSILON,
};
