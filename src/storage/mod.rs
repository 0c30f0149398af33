mod notifications;
mod schema;
mod series;
mod store;
mod types;

pub use schema::Database;
pub use store::Store;
pub use types::{
    DatabaseError, Notification, Series, SubscribedSeries, Subscription, Unsubscribed,
    WatchlistEntry,
};
