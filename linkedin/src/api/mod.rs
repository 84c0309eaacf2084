//! Typed wrappers for the REST resources the client reads and writes directly.

mod assets;
mod comments;
mod posts;
mod profile;

pub use assets::{AssetState, AssetStatus};
pub use comments::{AuditStamp, Comment, CommentMessage};
pub use posts::{
    Article, Distribution, FeedDistribution, LifecycleState, PostContent, PostMedia, PostPayload,
    SharedPost, Visibility,
};
pub use profile::{DisplayImage, LocalizedProperty, PreferredLocale, Profile};
