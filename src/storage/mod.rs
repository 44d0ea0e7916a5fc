mod feeds;
mod follows;
mod gateway;
mod posts;
mod schema;
mod types;
mod users;

pub use gateway::FeedStore;
pub use schema::Database;
pub use types::{
    DatabaseError, Feed, FeedFollow, FeedWithOwner, NewPost, Post, PostWithFeed, User,
};
