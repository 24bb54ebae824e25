// Social engine data model - content documents, relation edges and derived views

pub mod content;
pub mod edges;
pub mod view;

pub use content::{Comment, NewComment, NewPost, Post};
pub use edges::{Edge, EdgeKind, NewEdge, TargetType};
pub use view::{CommentViewModel, PostStats, PostViewModel, ThreadView};
