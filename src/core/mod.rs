// Core types and primitives shared by the store and the engine

pub mod strong_types;

pub use strong_types::{CommentId, EdgeId, PostId, TargetId, UserId};
