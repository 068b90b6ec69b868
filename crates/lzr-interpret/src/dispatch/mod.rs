//! Method dispatch on the class attribute (S3) and on formal classes (S4).

mod s3;
mod s4;

pub use s4::*;
