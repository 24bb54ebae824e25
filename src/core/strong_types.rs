// Strong Types - opaque string identifiers for the social engine
// Every id crossing the store boundary is a newtype so a PostId can never be
// passed where a UserId is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Empty ids are never valid at the store boundary
            pub fn is_valid(&self) -> bool {
                !self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Acting user, supplied by the session/auth collaborator
    UserId
);
string_id!(
    /// Post document id
    PostId
);
string_id!(
    /// Comment document id
    CommentId
);
string_id!(
    /// Anything an edge can point at: a post or a comment
    TargetId
);
string_id!(
    /// Edge record id assigned by the relation store
    EdgeId
);

impl From<PostId> for TargetId {
    fn from(id: PostId) -> Self {
        Self(id.0)
    }
}

impl From<&PostId> for TargetId {
    fn from(id: &PostId) -> Self {
        Self(id.0.clone())
    }
}

impl From<CommentId> for TargetId {
    fn from(id: CommentId) -> Self {
        Self(id.0)
    }
}

impl From<&CommentId> for TargetId {
    fn from(id: &CommentId) -> Self {
        Self(id.0.clone())
    }
}

impl PartialEq<PostId> for TargetId {
    fn eq(&self, other: &PostId) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<CommentId> for TargetId {
    fn eq(&self, other: &CommentId) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_conversions() {
        let post = PostId::new("p1");
        let comment = CommentId::new("c1");

        let t1: TargetId = (&post).into();
        let t2: TargetId = comment.clone().into();

        assert_eq!(t1, post);
        assert_eq!(t2, comment);
        assert_eq!(t1.as_str(), "p1");
    }

    #[test]
    fn test_generated_ids_are_unique_and_valid() {
        let a = EdgeId::generate();
        let b = EdgeId::generate();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(!UserId::new("  ").is_valid());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = UserId::new("alice");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
